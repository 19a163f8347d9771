#![allow(missing_docs)]

use rowgraph::rank::{seed_ranks, RankJob, RankOptions, Seed};
use rowgraph::storage::{
    ColumnFilter, GraphConfig, GraphStore, KvStore, PropValue, ScanRange, SqliteStore,
    StoreProvider,
};
use rowgraph::types::{EdgeKey, GraphError, VertexId};
use tempfile::TempDir;

fn store(dir: &TempDir) -> SqliteStore {
    SqliteStore::new(dir.path().join("graph.db"))
        .create_if_missing(true)
        .scan_batch(2)
}

fn config() -> GraphConfig {
    GraphConfig::new("vertex", "edge")
}

#[test]
fn keys_sort_by_raw_bytes() {
    let dir = TempDir::new().unwrap();
    let table = store(&dir).open_table("edge").unwrap();
    let keys: [&[u8]; 7] = [b"A|l|B", b"A}", b"AB|l|Q", b"A|l|Z", b"A", &[0xffu8], b"A~"];
    for key in keys {
        table.put(key, b"label$String", b"l").unwrap();
    }
    let keys: Vec<Vec<u8>> = table
        .scan(ScanRange::all(), ColumnFilter::FirstCellOnly)
        .unwrap()
        .map(|r| r.unwrap().key)
        .collect();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);
    assert_eq!(keys.len(), 7);
}

#[test]
fn adjacency_scan_over_sqlite_is_bounded() {
    let dir = TempDir::new().unwrap();
    let graph = GraphStore::open(&store(&dir), &config()).unwrap();
    for (s, d) in [("A", "B"), ("A", "Z"), ("AB", "Q"), ("A}", "R"), ("@", "S")] {
        graph.put_edge(&EdgeKey::new(s, "l1", d), &[]).unwrap();
    }
    let ids: Vec<String> = graph
        .outgoing_edge_ids(&VertexId::from("A"))
        .unwrap()
        .map(|id| id.unwrap().to_string())
        .collect();
    assert_eq!(ids, vec!["B", "Z"]);
}

#[test]
fn properties_survive_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let graph = GraphStore::open(&store(&dir), &config()).unwrap();
        graph
            .put_vertex(
                &VertexId::from("ada"),
                &[
                    ("name", PropValue::Str("Ada".into())),
                    ("born", PropValue::Int(1815)),
                    ("active", PropValue::Bool(false)),
                ],
            )
            .unwrap();
        graph.put_rank(&VertexId::from("ada"), 0.125).unwrap();
    }
    let reopened =
        GraphStore::open(&SqliteStore::new(dir.path().join("graph.db")), &config()).unwrap();
    let vertex = reopened.get_vertex(&VertexId::from("ada")).unwrap().unwrap();
    assert_eq!(vertex.props.get("born"), Some(&PropValue::Int(1815)));
    assert_eq!(vertex.props.get("active"), Some(&PropValue::Bool(false)));
    assert_eq!(reopened.get_rank(&VertexId::from("ada")).unwrap(), Some(0.125));
}

#[test]
fn parallel_job_over_sqlite_matches_sequential() {
    let dir = TempDir::new().unwrap();
    let sqlite = store(&dir);
    let graph = GraphStore::open(&sqlite, &config()).unwrap();
    let edges = [
        ("a", "b"),
        ("a", "c"),
        ("b", "c"),
        ("c", "a"),
        ("d", "a"),
        ("d", "b"),
        ("d", "c"),
        ("e", "e"),
    ];
    for (s, d) in edges {
        graph.put_edge(&EdgeKey::new(s, "next", d), &[]).unwrap();
    }
    for v in ["a", "b", "c", "d", "e", "f"] {
        graph.put_rank(&VertexId::from(v), 0.0).unwrap();
    }
    assert_eq!(seed_ranks(&graph, Seed::Uniform).unwrap(), 6);

    let scratch = TempDir::new().unwrap();
    let sequential = RankJob::new(
        &sqlite,
        config(),
        RankOptions {
            partitions: 1,
            reducers: 1,
            scratch_dir: scratch.path().to_path_buf(),
            ..RankOptions::default()
        },
    )
    .unwrap()
    .propagate()
    .unwrap();
    let parallel = RankJob::new(
        &sqlite,
        config(),
        RankOptions {
            partitions: 4,
            reducers: 3,
            scratch_dir: scratch.path().to_path_buf(),
            ..RankOptions::default()
        },
    )
    .unwrap()
    .propagate()
    .unwrap();
    assert_eq!(sequential.updates, parallel.updates);
    assert_eq!(parallel.stats.vertices, 6);
    assert_eq!(parallel.stats.sinks, 1);
}

#[test]
fn undecodable_property_is_surfaced() {
    let dir = TempDir::new().unwrap();
    let sqlite = store(&dir);
    let graph = GraphStore::open(&sqlite, &config()).unwrap();
    sqlite
        .open_table("vertex")
        .unwrap()
        .put(b"x", b"pageRank$Double", b"\x01\x02")
        .unwrap();
    assert!(matches!(
        graph.get_rank(&VertexId::from("x")),
        Err(GraphError::UnsupportedType(_))
    ));
}
