//! Deep-save traversal against the in-memory backend: no-op contract,
//! visited de-duplication, output readback, and round trips.

use tiderow::backend::{Backend, BackendProfile};
use tiderow::config::EngineConfig;
use tiderow::engine::GraphEngine;
use tiderow::entity::{Entity, Member};
use tiderow::mapping::MappingRegistry;
use tiderow::query::{CompareOp, QueryDescriptor};
use tiderow::value::ValueType;

use crate::fixtures::{self, CountingBackend};

fn engine<'a, B: Backend>(registry: &'a MappingRegistry, backend: &'a B) -> GraphEngine<'a, B> {
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

#[test]
fn test_clean_entity_save_issues_zero_statements() {
    let registry = fixtures::registry();
    let backend = CountingBackend::new(fixtures::seeded_backend());
    let engine = engine(&registry, &backend);

    let mut user = engine.deep_load("User", &by_id(1), Some(0), None).unwrap().unwrap();
    backend.reset();
    engine.deep_save(&mut user, None).unwrap();
    assert_eq!(backend.executes(), 0);
    assert_eq!(backend.queries(), 0);
}

#[test]
fn test_round_trip_of_scalar_only_entity_issues_nothing() {
    let registry = fixtures::registry();
    let backend = CountingBackend::new(fixtures::seeded_backend());
    let engine = engine(&registry, &backend);

    let mut tag = engine
        .deep_load("Tag", &QueryDescriptor::new().filter("tag_id", CompareOp::Eq, 10i32.into_value()), None, None)
        .unwrap()
        .unwrap();
    backend.reset();
    engine.deep_save(&mut tag, None).unwrap();
    assert_eq!(backend.executes(), 0);
}

#[test]
fn test_insert_refreshes_generated_identity() {
    let registry = fixtures::registry();
    let backend = fixtures::empty_backend();
    let engine = engine(&registry, &backend);

    let mut user = Entity::new(registry.get("User").unwrap());
    user.set("name", "Edsger".to_string().into_value()).unwrap();
    engine.save_one(&mut user, None).unwrap();

    // Identity came back from the backend and the change-state cleared.
    assert_eq!(user.get("id"), Some(&1i32.into_value()));
    assert!(user.state().is_clean());

    // load(save(newEntity)) by identity retrieves equal field values.
    let loaded = engine.deep_load("User", &by_id(1), Some(0), None).unwrap().unwrap();
    assert_eq!(loaded.get("name"), user.get("name"));
    assert_eq!(loaded.get("id"), user.get("id"));
}

#[test]
fn test_update_writes_only_modified_members() {
    let registry = fixtures::registry();
    let backend = CountingBackend::new(fixtures::seeded_backend());
    let engine = engine(&registry, &backend);

    let mut user = engine.find_one("User", &by_id(1), None).unwrap().unwrap();
    backend.reset();
    user.set("name", "Ada Lovelace".to_string().into_value()).unwrap();
    engine.save_one(&mut user, None).unwrap();
    assert_eq!(backend.executes(), 1);

    let reloaded = engine.find_one("User", &by_id(1), None).unwrap().unwrap();
    assert_eq!(reloaded.get("name"), Some(&"Ada Lovelace".to_string().into_value()));
    // Untouched column survives.
    assert_eq!(reloaded.get("best_friend_id"), Some(&2i32.into_value()));
}

#[test]
fn test_delete_removes_row_and_resaves_are_noops() {
    let registry = fixtures::registry();
    let backend = CountingBackend::new(fixtures::seeded_backend());
    let engine = engine(&registry, &backend);

    let mut alan = engine.find_one("User", &by_id(3), None).unwrap().unwrap();
    alan.mark_deleted();
    backend.reset();
    engine.save_one(&mut alan, None).unwrap();
    assert_eq!(backend.executes(), 1);
    assert_eq!(backend.inner().row_count("users"), 2);
    assert!(alan.state().is_clean());

    // A repeated save of the now-clean entity issues nothing.
    engine.save_one(&mut alan, None).unwrap();
    assert_eq!(backend.executes(), 1);
}

#[test]
fn test_mark_new_reinserts_deleted_entity() {
    let registry = fixtures::registry();
    let backend = fixtures::seeded_backend();
    let engine = engine(&registry, &backend);

    let mut alan = engine.find_one("User", &by_id(3), None).unwrap().unwrap();
    alan.mark_deleted();
    engine.save_one(&mut alan, None).unwrap();
    assert_eq!(backend.row_count("users"), 2);

    // The cleared entity re-enters the table only once marked new again.
    alan.mark_new();
    engine.save_one(&mut alan, None).unwrap();
    assert_eq!(backend.row_count("users"), 3);
}

#[test]
fn test_deep_save_persists_shared_subentity_once() {
    let registry = fixtures::registry();
    let backend = CountingBackend::new(fixtures::empty_backend());
    let engine = engine(&registry, &backend);

    let mut person = Entity::new(registry.get("Person").unwrap());
    person.set("id", 7i32.into_value()).unwrap();
    person.set("name", "Sam".to_string().into_value()).unwrap();

    // The same person is reachable through two different members.
    let mut team = Entity::new(registry.get("Team").unwrap());
    team.set("id", 1i32.into_value()).unwrap();
    team.set("name", "Core".to_string().into_value()).unwrap();
    team.set("lead_id", 7i32.into_value()).unwrap();
    team.set_member("lead", Member::One(person.clone()));
    team.set_member("members", Member::Many(vec![person]));

    engine.deep_save(&mut team, None).unwrap();
    assert_eq!(backend.executes(), 2);
    assert_eq!(backend.inner().row_count("teams"), 1);
    assert_eq!(backend.inner().row_count("persons"), 1);
}

#[test]
fn test_deep_save_wraps_scalar_members() {
    let registry = fixtures::registry();
    let backend = CountingBackend::new(fixtures::empty_backend());
    let engine = engine(&registry, &backend);

    let mut user = Entity::new(registry.get("User").unwrap());
    user.set("name", "Barbara".to_string().into_value()).unwrap();
    user.set_member(
        "nicknames",
        Member::ScalarList(vec![
            "barb".to_string().into_value(),
            "b".to_string().into_value(),
            // Duplicate value: de-duplicated through the visited set.
            "barb".to_string().into_value(),
        ]),
    );

    engine.deep_save(&mut user, None).unwrap();
    assert_eq!(backend.executes(), 3);
    assert_eq!(backend.inner().row_count("nicknames"), 2);
}

#[test]
fn test_deep_save_recurses_through_loaded_graph() {
    let registry = fixtures::registry();
    let backend = CountingBackend::new(fixtures::seeded_backend());
    let engine = engine(&registry, &backend);

    // Load one level deep, dirty a child, save the root: the child's
    // UPDATE is the only statement issued.
    let mut post = engine.deep_load("Post", &by_id(1), Some(1), None).unwrap().unwrap();
    if let Some(Member::Many(comments)) = post.member_mut("comments") {
        comments[0].set("body", "C1 (edited)".to_string().into_value()).unwrap();
    } else {
        panic!("comments member not loaded");
    }
    backend.reset();
    engine.deep_save(&mut post, None).unwrap();
    assert_eq!(backend.executes(), 1);

    let comment = engine
        .deep_load("Comment", &by_id(1), Some(0), None)
        .unwrap()
        .unwrap();
    assert_eq!(comment.get("body"), Some(&"C1 (edited)".to_string().into_value()));
}
