//! Deep-load traversal against the in-memory backend: relationship
//! dispatch, depth budgets, cycle safety, and many-to-many handling.

use sea_query::Value;
use tiderow::backend::memory::MemoryBackend;
use tiderow::backend::BackendProfile;
use tiderow::config::EngineConfig;
use tiderow::engine::GraphEngine;
use tiderow::entity::{Entity, Member};
use tiderow::mapping::MappingRegistry;
use tiderow::query::{CompareOp, QueryDescriptor};
use tiderow::value::ValueType;

use crate::fixtures;

fn engine<'a>(
    registry: &'a MappingRegistry,
    backend: &'a MemoryBackend,
) -> GraphEngine<'a, MemoryBackend> {
    GraphEngine::new(
        registry,
        backend,
        EngineConfig::default(),
        BackendProfile::memory(),
    )
}

fn by_id(id: i32) -> QueryDescriptor {
    QueryDescriptor::new().filter("id", CompareOp::Eq, id.into_value())
}

fn one<'e>(entity: &'e Entity, member: &str) -> &'e Entity {
    match entity.member(member) {
        Some(Member::One(child)) => child,
        other => panic!("expected single-valued member {member}, got {other:?}"),
    }
}

fn many<'e>(entity: &'e Entity, member: &str) -> &'e [Entity] {
    match entity.member(member) {
        Some(Member::Many(children)) => children,
        other => panic!("expected collection member {member}, got {other:?}"),
    }
}

#[test]
fn test_one_to_many_populates_collection() {
    let registry = fixtures::registry();
    let backend = fixtures::seeded_backend();
    let engine = engine(&registry, &backend);

    let user = engine.deep_load("User", &by_id(1), None, None).unwrap().unwrap();
    let posts = many(&user, "posts");
    assert_eq!(posts.len(), 3);
    // Each element is independently deep-loaded up to the remaining
    // budget: the author member is populated on every post.
    for post in posts {
        assert_eq!(one(post, "author").get("id"), Some(&1i32.into_value()));
    }
    let comments = many(&posts[0], "comments");
    assert_eq!(comments.len(), 2);
}

#[test]
fn test_many_to_one_loads_parent() {
    let registry = fixtures::registry();
    let backend = fixtures::seeded_backend();
    let engine = engine(&registry, &backend);

    let post = engine.deep_load("Post", &by_id(4), None, None).unwrap().unwrap();
    let author = one(&post, "author");
    assert_eq!(author.get("name"), Some(&"Grace".to_string().into_value()));
}

#[test]
fn test_depth_zero_returns_flat_entity() {
    let registry = fixtures::registry();
    let backend = fixtures::seeded_backend();
    let engine = engine(&registry, &backend);

    let user = engine.deep_load("User", &by_id(1), Some(0), None).unwrap().unwrap();
    assert_eq!(user.get("name"), Some(&"Ada".to_string().into_value()));
    assert_eq!(user.members().count(), 0);
}

#[test]
fn test_depth_one_expands_one_level() {
    let registry = fixtures::registry();
    let backend = fixtures::seeded_backend();
    let engine = engine(&registry, &backend);

    let user = engine.deep_load("User", &by_id(1), Some(1), None).unwrap().unwrap();
    let posts = many(&user, "posts");
    assert_eq!(posts.len(), 3);
    // Deeper relationship members stay unpopulated.
    for post in posts {
        assert!(post.member("author").is_none());
        assert!(post.member("comments").is_none());
    }
    let friend = one(&user, "best_friend");
    assert!(friend.member("posts").is_none());
}

#[test]
fn test_cycle_terminates_with_structurally_equal_reencounter() {
    let registry = fixtures::registry();
    let backend = fixtures::seeded_backend();
    let engine = engine(&registry, &backend);

    // Ada and Grace reference each other; unbounded traversal must
    // terminate and hand the second encounter of Ada back as the first
    // instance.
    let ada = engine.deep_load("User", &by_id(1), None, None).unwrap().unwrap();
    let grace = one(&ada, "best_friend");
    assert_eq!(grace.get("name"), Some(&"Grace".to_string().into_value()));
    let ada_again = one(grace, "best_friend");
    assert_eq!(ada_again, &ada);
}

#[test]
fn test_not_found_is_none_not_an_error() {
    let registry = fixtures::registry();
    let backend = fixtures::seeded_backend();
    let engine = engine(&registry, &backend);

    let missing = engine.deep_load("User", &by_id(99), None, None).unwrap();
    assert!(missing.is_none());
}

#[test]
fn test_null_join_key_leaves_member_unpopulated() {
    let registry = fixtures::registry();
    let backend = fixtures::seeded_backend();
    let engine = engine(&registry, &backend);

    // Alan's best_friend_id is NULL; equality on NULL matches nothing.
    let alan = engine.deep_load("User", &by_id(3), None, None).unwrap().unwrap();
    assert!(alan.member("best_friend").is_none());
    assert_eq!(many(&alan, "posts").len(), 0);
}

#[test]
fn test_many_to_many_via_junction() {
    let registry = fixtures::registry();
    let backend = fixtures::seeded_backend();
    let engine = engine(&registry, &backend);

    let ada = engine.deep_load("User", &by_id(1), None, None).unwrap().unwrap();
    let tags = many(&ada, "tags");
    let labels: Vec<_> = tags.iter().map(|t| t.get("label").cloned().unwrap()).collect();
    assert_eq!(
        labels,
        vec![
            "rust".to_string().into_value(),
            "orm".to_string().into_value(),
        ]
    );

    let grace = engine.deep_load("User", &by_id(2), None, None).unwrap().unwrap();
    assert_eq!(many(&grace, "tags").len(), 1);
}

#[test]
fn test_many_to_many_without_junction_degrades_to_one_to_many() {
    let registry = fixtures::registry();
    let backend = fixtures::seeded_backend();
    let engine = engine(&registry, &backend);

    let ada = engine.deep_load("User", &by_id(1), None, None).unwrap().unwrap();
    // `badges` is ManyToMany with no junction, `badges_list` an explicit
    // OneToMany over the same join predicate. Identical results.
    assert_eq!(many(&ada, "badges").len(), 2);
    assert_eq!(ada.member("badges"), ada.member("badges_list"));
}

#[test]
fn test_scalar_relation_target_unwraps_values() {
    let registry = fixtures::registry();
    let backend = fixtures::seeded_backend();
    let engine = engine(&registry, &backend);

    let ada = engine.deep_load("User", &by_id(1), None, None).unwrap().unwrap();
    match ada.member("nicknames") {
        Some(Member::ScalarList(values)) => {
            assert_eq!(
                values,
                &vec![
                    "ada".to_string().into_value(),
                    "countess".to_string().into_value(),
                ]
            );
        }
        other => panic!("expected scalar list, got {other:?}"),
    }
}

#[test]
fn test_field_level_foreign_ref_assigns_member() {
    let registry = fixtures::registry();
    let backend = fixtures::seeded_backend();
    let engine = engine(&registry, &backend);

    let comment = engine.deep_load("Comment", &by_id(1), None, None).unwrap().unwrap();
    let post = one(&comment, "post");
    assert_eq!(post.get("title"), Some(&"P1".to_string().into_value()));
    assert_eq!(one(post, "author").get("name"), Some(&"Ada".to_string().into_value()));
}

#[test]
fn test_deep_load_all_shares_one_visited_set() {
    let registry = fixtures::registry();
    let backend = fixtures::seeded_backend();
    let engine = engine(&registry, &backend);

    let query = QueryDescriptor::new().filter("id", CompareOp::LtEq, 2i32.into_value());
    let users = engine.deep_load_all("User", &query, None, None).unwrap();
    assert_eq!(users.len(), 2);
    assert_eq!(users[0].get("name"), Some(&"Ada".to_string().into_value()));
    // Grace was already visited while expanding Ada's best_friend, so
    // the second root resolves from the visited set.
    assert_eq!(users[1].get("name"), Some(&"Grace".to_string().into_value()));
}

#[test]
fn test_sort_order_applies_to_roots() {
    let registry = fixtures::registry();
    let backend = fixtures::seeded_backend();
    let engine = engine(&registry, &backend);

    let query = QueryDescriptor::new()
        .filter("user_id", CompareOp::Eq, 1i32.into_value())
        .order_by("id", tiderow::query::SortOrder::Desc);
    let posts = engine.deep_load_all("Post", &query, Some(0), None).unwrap();
    let ids: Vec<_> = posts.iter().map(|p| p.get("id").cloned().unwrap()).collect();
    assert_eq!(
        ids,
        vec![Value::Int(Some(3)), Value::Int(Some(2)), Value::Int(Some(1))]
    );
}
