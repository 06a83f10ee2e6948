use tabtree::{ApiCall, ApiCallKind, MemoryStore, Settings, Snapshot, TreeMutator};
use tabtree::{GroupId, MoveRequest, NodeId, NodeSpec, Placement, ReorderRequest, TreeError, TreeStore};
use anyhow::Result;
use egui::{pos2, vec2, Rect};
use std::env;
use std::fs;

type Mutator = TreeMutator<MemoryStore, MemoryStore>;

fn open(name: &str) -> Result<(MemoryStore, Mutator)> {
    let store = MemoryStore::new();
    let group = store.create_group(name)?;
    let mutator = TreeMutator::open(store.clone(), store.clone(), group.id, Settings::default())?;
    Ok((store, mutator))
}

fn row() -> Rect {
    Rect::from_min_size(pos2(0.0, 0.0), vec2(240.0, 100.0))
}

fn child_ids(mutator: &Mutator, id: NodeId) -> Result<Vec<NodeId>> {
    Ok(mutator.registry().get_node(id)?.children.clone())
}

/// P1 ─── X ─── XC
/// P2 ─┬─ Y
///     └─ Z
struct Scenario {
    p1: NodeId,
    x: NodeId,
    xc: NodeId,
    p2: NodeId,
    y: NodeId,
    z: NodeId,
}

fn build_scenario(mutator: &mut Mutator) -> Result<Scenario> {
    let p1 = mutator.create_root("P1", "https://p1.example")?;
    let x = mutator.create_child(p1, "X", "https://x.example")?;
    let xc = mutator.create_child(x, "XC", "https://xc.example")?;
    let p2 = mutator.create_root("P2", "https://p2.example")?;
    let y = mutator.create_child(p2, "Y", "https://y.example")?;
    let z = mutator.create_child(p2, "Z", "https://z.example")?;
    Ok(Scenario { p1, x, xc, p2, y, z })
}

#[test]
fn test_drag_after_sibling_under_other_parent() -> Result<()> {
    let (store, mut mutator) = open("Drag")?;
    let s = build_scenario(&mut mutator)?;
    store.clear_calls();

    let snapshot = mutator.begin_drag(s.x)?;
    assert!(snapshot.locked);
    assert_eq!(snapshot.original_parent, Some(s.p1));

    let mark = mutator.hover(s.y, pos2(20.0, 90.0), row())?;
    assert_eq!(mark.map(|m| m.placement), Some(Placement::After));

    let outcome = mutator.end_drag()?;
    assert!(outcome.moved);
    assert!(outcome.reordered);

    assert_eq!(mutator.registry().get_node(s.x)?.parent_id, Some(s.p2));
    assert_eq!(child_ids(&mutator, s.p2)?, vec![s.y, s.x, s.z]);
    assert_eq!(child_ids(&mutator, s.x)?, vec![s.xc]);
    assert!(child_ids(&mutator, s.p1)?.is_empty());

    assert_eq!(
        store.calls(),
        vec![
            ApiCall::Move {
                id: s.x,
                request: MoveRequest {
                    new_parent_id: Some(s.p2),
                    with_subtree: true
                }
            },
            ApiCall::Reorder {
                id: s.x,
                request: ReorderRequest {
                    target_node_id: s.y,
                    after: true
                }
            },
        ]
    );

    // The registry mirror matches the store exactly.
    assert_eq!(
        mutator.registry().records(mutator.group()),
        store.fetch_forest(mutator.group())?
    );
    Ok(())
}

#[test]
fn test_unlocked_child_drop_leaves_children_behind() -> Result<()> {
    let (store, mut mutator) = open("Unlocked")?;
    let s = build_scenario(&mut mutator)?;
    mutator.toggle_lock(s.x)?;
    store.clear_calls();

    mutator.begin_drag(s.x)?;
    mutator.hover(s.z, pos2(20.0, 50.0), row())?;
    let outcome = mutator.end_drag()?;
    assert!(!outcome.with_subtree);
    assert_eq!(outcome.intent.placement, Placement::Child);

    assert_eq!(mutator.registry().get_node(s.x)?.parent_id, Some(s.z));
    assert_eq!(mutator.registry().get_node(s.xc)?.parent_id, Some(s.p1));
    assert_eq!(mutator.registry().get_node(s.x)?.depth, 2);
    assert_eq!(store.calls().len(), 1);
    Ok(())
}

#[test]
fn test_phase_two_failure_is_reported_as_conflict() -> Result<()> {
    let (store, mut mutator) = open("Conflict")?;
    let s = build_scenario(&mut mutator)?;
    store.clear_calls();
    store.fail_next(ApiCallKind::Reorder);

    mutator.begin_drag(s.x)?;
    mutator.hover(s.y, pos2(20.0, 10.0), row())?;
    let err = mutator.end_drag().unwrap_err();

    assert!(matches!(err, TreeError::MutationConflict { node, .. } if node == s.x));
    assert!(err.is_partial());

    // Moved but not reordered, and the mirror shows exactly that.
    assert_eq!(
        store.calls().iter().map(ApiCall::kind).collect::<Vec<_>>(),
        vec![ApiCallKind::Move]
    );
    assert_eq!(child_ids(&mutator, s.p2)?, vec![s.y, s.z, s.x]);
    assert!(mutator.session().is_idle());
    assert_eq!(mutator.drop_mark(), None);
    Ok(())
}

#[test]
fn test_barrier_fetch_failure_is_conflict_and_mirror_follows_store() -> Result<()> {
    let (store, mut mutator) = open("Barrier")?;
    let s = build_scenario(&mut mutator)?;
    store.clear_calls();
    store.fail_next(ApiCallKind::FetchForest);

    mutator.begin_drag(s.x)?;
    mutator.hover(s.y, pos2(20.0, 90.0), row())?;
    let err = mutator.end_drag().unwrap_err();

    assert!(matches!(err, TreeError::MutationConflict { node, .. } if node == s.x));
    assert!(err.is_partial());
    assert_eq!(
        store.calls().iter().map(ApiCall::kind).collect::<Vec<_>>(),
        vec![ApiCallKind::Move]
    );

    // The move landed, so the mirror shows it even though the store could not be read.
    assert_eq!(mutator.registry().get_node(s.x)?.parent_id, Some(s.p2));
    assert_eq!(child_ids(&mutator, s.p2)?, vec![s.y, s.z, s.x]);
    assert_eq!(
        mutator.registry().records(mutator.group()),
        store.fetch_forest(mutator.group())?
    );
    let under_p2: Vec<NodeId> = mutator.forest()[1].children.iter().map(|n| n.id).collect();
    assert_eq!(under_p2, vec![s.y, s.z, s.x]);
    assert!(mutator.session().is_idle());
    Ok(())
}

#[test]
fn test_drop_before_root_moves_to_root_then_reorders() -> Result<()> {
    let (store, mut mutator) = open("Roots")?;
    let s = build_scenario(&mut mutator)?;
    store.clear_calls();

    mutator.begin_drag(s.x)?;
    let mark = mutator.hover(s.p2, pos2(20.0, 10.0), row())?;
    assert_eq!(mark.map(|m| m.placement), Some(Placement::Before));
    let outcome = mutator.end_drag()?;
    assert!(outcome.moved);
    assert!(outcome.reordered);

    assert_eq!(mutator.registry().root_ids(mutator.group()), &[s.p1, s.x, s.p2]);
    assert_eq!(mutator.registry().get_node(s.x)?.depth, 0);
    assert_eq!(mutator.registry().get_node(s.xc)?.depth, 1);
    assert_eq!(
        store.calls(),
        vec![
            ApiCall::Move {
                id: s.x,
                request: MoveRequest {
                    new_parent_id: None,
                    with_subtree: true
                }
            },
            ApiCall::Reorder {
                id: s.x,
                request: ReorderRequest {
                    target_node_id: s.p2,
                    after: false
                }
            },
        ]
    );
    Ok(())
}

#[test]
fn test_bulk_insert_creates_nested_tabs() -> Result<()> {
    let (store, mut mutator) = open("Bulk")?;
    let specs = vec![NodeSpec::leaf("A", "http://a")
        .with_children(vec![NodeSpec::leaf("B", "http://b")])];

    let created = mutator.bulk_insert(None, &specs)?;
    assert_eq!(created.len(), 1);
    assert_eq!(store.node_count(mutator.group()), 2);

    let a = mutator.registry().get_node(created[0].id)?;
    let b = mutator.registry().get_node(created[0].children[0].id)?;
    assert_eq!(b.parent_id, Some(a.id));
    assert_eq!(b.depth, a.depth + 1);
    assert_eq!(
        store.calls().iter().map(ApiCall::kind).collect::<Vec<_>>(),
        vec![ApiCallKind::BulkCreate]
    );
    Ok(())
}

#[test]
fn test_invalid_bulk_batch_changes_nothing() -> Result<()> {
    let (store, mut mutator) = open("Rejected")?;
    let root = mutator.create_root("Root", "https://root.example")?;
    store.clear_calls();

    let specs = vec![
        NodeSpec::leaf("Fine", "https://fine.example"),
        NodeSpec::leaf("Parent", "https://parent.example")
            .with_children(vec![NodeSpec::leaf("No url", "")]),
    ];
    let err = mutator.bulk_insert(Some(root), &specs).unwrap_err();
    assert!(matches!(err, TreeError::ValidationFailed { .. }));
    assert!(store.calls().is_empty());
    assert_eq!(store.node_count(mutator.group()), 1);
    Ok(())
}

#[test]
fn test_delete_without_subtree_promotes_in_order() -> Result<()> {
    let (_store, mut mutator) = open("Delete")?;
    let p = mutator.create_root("P", "https://p.example")?;
    let a = mutator.create_child(p, "A", "https://a.example")?;
    let x = mutator.create_child(p, "X", "https://x.example")?;
    let c1 = mutator.create_child(x, "C1", "https://c1.example")?;
    let c2 = mutator.create_child(x, "C2", "https://c2.example")?;
    let before = mutator.registry().len();

    mutator.delete_node(x, false)?;
    assert_eq!(mutator.registry().len(), before - 1);
    assert_eq!(child_ids(&mutator, p)?, vec![a, c1, c2]);
    Ok(())
}

#[test]
fn test_reparent_under_descendant_is_rejected_unchanged() -> Result<()> {
    let (store, mut mutator) = open("Cycle")?;
    let s = build_scenario(&mut mutator)?;
    let before = serde_json::to_string(&store.fetch_forest(mutator.group())?)?;
    store.clear_calls();

    for with_subtree in [true, false] {
        let err = mutator.move_node(s.p1, Some(s.xc), with_subtree).unwrap_err();
        assert_eq!(err, TreeError::CycleDetected { node: s.p1, target: s.xc });
    }

    let after = serde_json::to_string(&store.fetch_forest(mutator.group())?)?;
    assert_eq!(before, after);
    assert!(store.calls().is_empty());
    Ok(())
}

#[test]
fn test_group_deletion_cascades_to_tabs_and_notes() -> Result<()> {
    let (store, mut mutator) = open("Doomed")?;
    let s = build_scenario(&mut mutator)?;
    store.add_content(s.xc, "deep note")?;
    let keep = store.create_group("Kept")?;

    assert_eq!(store.delete_group(mutator.group())?, 6);
    assert!(store.contents_of(s.xc).is_empty());
    assert_eq!(
        mutator.sync(),
        Err(TreeError::GroupNotFound(mutator.group()))
    );
    assert_eq!(store.groups().len(), 1);
    assert_eq!(store.groups()[0].id, keep.id);
    Ok(())
}

#[test]
fn test_snapshot_roundtrip_plain_and_brotli() -> Result<()> {
    let (store, mut mutator) = open("Persisted")?;
    let s = build_scenario(&mut mutator)?;
    store.add_content(s.y, "read later")?;
    let group: GroupId = mutator.group();

    for name in ["tabtree_roundtrip.json", "tabtree_roundtrip.json.br"] {
        let path = env::temp_dir().join(name);
        let _ = fs::remove_file(&path);

        store.snapshot().save(&path)?;
        let restored = MemoryStore::from_snapshot(Snapshot::load(&path)?, Settings::default())?;

        assert_eq!(restored.fetch_forest(group)?, store.fetch_forest(group)?);
        assert_eq!(restored.contents_of(s.y).len(), 1);
        assert_eq!(restored.group(group)?.name, "Persisted");

        fs::remove_file(&path)?;
    }
    Ok(())
}

#[test]
fn test_materialized_forest_tracks_mutations() -> Result<()> {
    let (_store, mut mutator) = open("View")?;
    let s = build_scenario(&mut mutator)?;

    let forest = mutator.forest();
    assert_eq!(forest.len(), 2);
    assert_eq!(forest.iter().map(|n| n.count()).sum::<usize>(), 6);

    mutator.reorder_node(s.z, s.y, false)?;
    let forest = mutator.forest();
    let under_p2: Vec<NodeId> = forest[1].children.iter().map(|n| n.id).collect();
    assert_eq!(forest[1].id, s.p2);
    assert_eq!(under_p2, vec![s.z, s.y]);

    let rows = mutator.rows();
    assert_eq!(rows.len(), 6);
    assert!(rows.windows(2).all(|w| w[0].row_index + 1 == w[1].row_index));
    Ok(())
}
