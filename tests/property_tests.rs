#![allow(missing_docs)]

use proptest::prelude::*;
use rowgraph::rank::{aggregate, dispatch, Contribution};
use rowgraph::storage::keys::{decode_edge_key, encode_edge_key};
use rowgraph::storage::props::{decode_qualifier, decode_value, encode_qualifier, encode_value};
use rowgraph::storage::{GraphConfig, GraphStore, MemoryStore, PropValue};
use rowgraph::types::{EdgeKey, VertexId};
use std::collections::BTreeSet;

const ID: &str = "[A-Za-z0-9_~{}$ -]{1,12}";

fn arb_prop_value() -> impl Strategy<Value = PropValue> {
    prop_oneof![
        ".{0,16}".prop_map(PropValue::Str),
        any::<i32>().prop_map(PropValue::Int),
        any::<i64>().prop_map(PropValue::Long),
        any::<f32>()
            .prop_filter("NaN never compares equal", |f| !f.is_nan())
            .prop_map(PropValue::Float),
        any::<f64>()
            .prop_filter("NaN never compares equal", |f| !f.is_nan())
            .prop_map(PropValue::Double),
        any::<bool>().prop_map(PropValue::Bool),
    ]
}

fn arb_contributions() -> impl Strategy<Value = Vec<Contribution>> {
    prop::collection::vec(("[a-e]", -1.0e6f64..1.0e6), 0..64).prop_map(|pairs| {
        pairs
            .into_iter()
            .map(|(dest, share)| Contribution {
                dest: VertexId::from(dest),
                share,
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn prop_edge_key_roundtrip(src in ID, label in ID, dst in ID) {
        let (source, dest) = (VertexId::from(src.as_str()), VertexId::from(dst.as_str()));
        let key = encode_edge_key(&source, &label, &dest);
        let decoded = decode_edge_key(&key).unwrap();
        prop_assert_eq!(decoded, EdgeKey::new(src.as_str(), label.as_str(), dst.as_str()));
    }

    #[test]
    fn prop_typed_value_roundtrip(value in arb_prop_value()) {
        let bytes = encode_value(&value);
        prop_assert_eq!(decode_value(value.tag(), &bytes).unwrap(), value);
    }

    #[test]
    fn prop_qualifier_roundtrip(name in ID, value in arb_prop_value()) {
        let qualifier = encode_qualifier(&name, value.tag());
        let (decoded_name, tag) = decode_qualifier(&qualifier).unwrap();
        prop_assert_eq!(decoded_name, name);
        prop_assert_eq!(tag, value.tag());
    }

    #[test]
    fn prop_dispatch_conserves_rank(rank in 0.0f64..1.0e3, degree in 0usize..32) {
        let dests: Vec<VertexId> = (0..degree).map(|i| VertexId::from(format!("v{i}"))).collect();
        let mut out: Vec<Contribution> = Vec::new();
        let emitted = dispatch(dests, rank, &mut out).unwrap();
        prop_assert_eq!(emitted, degree);
        prop_assert_eq!(out.len(), degree);
        if degree > 0 {
            let share = rank / degree as f64;
            prop_assert!(out.iter().all(|c| c.share == share));
            let total: f64 = out.iter().map(|c| c.share).sum();
            prop_assert!((total - rank).abs() <= 1e-9 * rank.max(1.0));
        }
    }

    #[test]
    fn prop_aggregation_ignores_order(
        (original, shuffled) in arb_contributions()
            .prop_flat_map(|v| (Just(v.clone()), Just(v).prop_shuffle()))
    ) {
        let a = aggregate(original);
        let b = aggregate(shuffled);
        prop_assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(&b) {
            prop_assert_eq!(&x.vertex, &y.vertex);
            prop_assert_eq!(x.rank.to_bits(), y.rank.to_bits());
        }
    }

    #[test]
    fn prop_adjacency_scan_is_exact(
        edges in prop::collection::vec(("[AB}~]{1,3}", "[a-c]{1,2}", "[AB}~]{1,3}"), 1..24),
        vertex in "[AB}~]{1,3}",
    ) {
        let store = MemoryStore::new().with_scan_batch(3);
        let graph = GraphStore::open(&store, &GraphConfig::new("vertex", "edge")).unwrap();
        for (s, l, d) in &edges {
            graph.put_edge(&EdgeKey::new(s.as_str(), l.as_str(), d.as_str()), &[]).unwrap();
        }
        let expected: BTreeSet<(String, String)> = edges
            .iter()
            .filter(|(s, _, _)| *s == vertex)
            .map(|(_, l, d)| (l.clone(), d.clone()))
            .collect();
        let found: BTreeSet<(String, String)> = graph
            .outgoing_edges(&VertexId::from(vertex.as_str()))
            .unwrap()
            .map(|e| {
                let e = e.unwrap();
                (e.label, e.dest.to_string())
            })
            .collect();
        prop_assert_eq!(found, expected);
    }
}
