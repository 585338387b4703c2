use super::*;
use proptest::prelude::*;
use std::collections::HashSet;

fn arb_tree() -> impl Strategy<Value = Tree<i32>> {
    let leaf = any::<i32>().prop_map(Tree::leaf);
    leaf.prop_recursive(4, 64, 4, |inner| {
        (any::<i32>(), prop::collection::vec(inner, 0..4))
            .prop_map(|(value, children)| Tree::node(value, children))
    })
}

/// Children lists for a random tree on `n + 1` vertices: vertex `j` hangs below a lower vertex.
fn arb_tree_graph() -> impl Strategy<Value = Vec<Vec<usize>>> {
    prop::collection::vec(any::<prop::sample::Index>(), 0..40).prop_map(|parents| {
        let mut children = vec![Vec::new(); parents.len() + 1];
        for (j, parent) in parents.iter().enumerate() {
            children[parent.index(j + 1)].push(j + 1);
        }
        children
    })
}

fn distances_are_consistent<A>(tree: &Tree<A>) -> bool {
    tree.children()
        .iter()
        .all(|c| c.distance() == tree.distance() + 1 && distances_are_consistent(c))
}

fn pool() -> ThreadPool {
    rayon::ThreadPoolBuilder::new()
        .num_threads(4)
        .build()
        .unwrap()
}

proptest! {
    #[test]
    fn map_identity_is_equal(tree in arb_tree()) {
        prop_assert_eq!(map(|v: &i32| *v, &tree), tree);
    }

    #[test]
    fn pmap_agrees_with_map(tree in arb_tree()) {
        let pool = pool();
        let f = |v: &i32| v.wrapping_mul(3).wrapping_sub(7);
        let parallel = pmap(&pool, |v: &i32| Ok::<_, String>(f(v)), &tree).unwrap();
        prop_assert_eq!(parallel, map(f, &tree));
    }

    #[test]
    fn nodes_are_built_with_consistent_distances(tree in arb_tree()) {
        prop_assert_eq!(tree.distance(), 0);
        prop_assert!(distances_are_consistent(&tree));
    }

    #[test]
    fn bfs_visits_tree_shaped_graph_once_in_distance_order(children in arb_tree_graph()) {
        let viewer = |n: &usize| children[*n].clone();
        let walked: Vec<TreeEntry<usize>> = bfs_walk(0usize, &viewer).collect();

        let unique: HashSet<usize> = walked.iter().map(|e| *e.value()).collect();
        prop_assert_eq!(walked.len(), children.len());
        prop_assert_eq!(unique.len(), children.len());
        prop_assert!(walked.windows(2).all(|w| w[0].distance() <= w[1].distance()));
    }

    #[test]
    fn tracked_bfs_visits_dag_vertices_once(
        edges in prop::collection::vec((0usize..20, 0usize..20), 0..80)
    ) {
        let mut children = vec![Vec::new(); 20];
        for (a, b) in edges {
            if a < b {
                children[a].push(b);
            }
        }
        let viewer = |n: &usize| children[*n].clone();
        let mut tracker = NodeAlreadyVisitedTracker::default();
        let walked: Vec<usize> = bfs_walk_tracked(0usize, &viewer, &mut tracker)
            .map(TreeEntry::into_value)
            .collect();
        let unique: HashSet<usize> = walked.iter().copied().collect();
        prop_assert_eq!(unique.len(), walked.len());
    }

    #[test]
    fn build_tree_keeps_exactly_the_nodes_within_depth(
        edges in prop::collection::vec((0usize..16, 0usize..16), 0..60),
        max_depth in 0usize..5,
    ) {
        let mut children = vec![Vec::new(); 16];
        for (a, b) in edges {
            children[a].push(b);
        }
        let viewer = |n: &usize| children[*n].clone();
        let mut shortest = std::collections::HashMap::new();
        let mut tracker = NodeAlreadyVisitedTracker::default();
        for entry in bfs_walk_tracked(0usize, &viewer, &mut tracker) {
            if entry.distance() <= max_depth {
                shortest.insert(*entry.value(), entry.distance());
            }
        }

        let tree = build_tree(0usize, &viewer, NodeAlreadyVisitedTracker::default(), max_depth)
            .unwrap();
        let built: std::collections::HashMap<usize, usize> =
            tree.iter().map(|e| (*e.value(), e.distance())).collect();
        prop_assert_eq!(built.len(), tree.len());
        prop_assert_eq!(built, shortest);
        prop_assert!(distances_are_consistent(&tree));
    }

    #[test]
    fn builder_assigns_parent_plus_one(children in arb_tree_graph()) {
        let viewer = |n: &usize| children[*n].clone();
        let mut builder = TreeBuilder::new();
        visit(0usize, &viewer, &mut builder);
        let tree = builder.into_tree().unwrap();
        prop_assert_eq!(tree.distance(), 0);
        prop_assert!(distances_are_consistent(&tree));
        prop_assert_eq!(tree.len(), children.len());
    }
}

fn sample_tree() -> Tree<i32> {
    Tree::node(
        1,
        vec![
            Tree::node(2, vec![Tree::leaf(4), Tree::leaf(5)]),
            Tree::node(3, vec![Tree::leaf(6)]),
        ],
    )
}

#[test]
fn pmap_reports_first_failure_in_encounter_order() {
    let pool = pool();
    let tree = sample_tree();
    let result = pmap(
        &pool,
        |v: &i32| {
            if *v == 5 || *v == 3 {
                Err(format!("bad {v}"))
            } else {
                Ok(*v)
            }
        },
        &tree,
    );
    // pre-order is 1 2 4 5 3 6
    assert_eq!(result, Err(TaskError::Failed("bad 5".to_string())));
}

#[test]
fn pmap_distinguishes_panics_from_failures() {
    let pool = pool();
    let tree = sample_tree();
    let result = pmap(
        &pool,
        |v: &i32| {
            if *v == 6 {
                panic!("boom");
            }
            Ok::<_, String>(*v)
        },
        &tree,
    );
    assert_eq!(result, Err(TaskError::Interrupted("boom".to_string())));

    let err: DegraphmalizerError = TaskError::<String>::Interrupted("boom".into()).into();
    assert!(matches!(err, DegraphmalizerError::Interrupted(_)));
}

#[test]
fn optional_is_all_or_nothing() {
    let present = map(|v: &i32| Some(*v), &sample_tree());
    assert_eq!(optional(present), Some(sample_tree()));

    let one_absent = map(|v: &i32| if *v == 6 { None } else { Some(*v) }, &sample_tree());
    assert_eq!(optional(one_absent), None);

    let root_absent = Tree::node(None, vec![Tree::leaf(Some(1))]);
    assert_eq!(optional(root_absent), None);
}

#[test]
fn tree_helpers() {
    let tree = sample_tree();
    assert_eq!(tree.len(), 6);
    assert_eq!(tree.depth(), 2);
    assert!(!tree.is_leaf());
    assert!(tree.children()[1].children()[0].is_leaf());
    assert_eq!(
        tree.iter().map(|e| *e.value()).collect::<Vec<_>>(),
        vec![1, 2, 4, 5, 3, 6]
    );
    assert_eq!(
        tree.bfs().map(|e| *e.value()).collect::<Vec<_>>(),
        vec![1, 2, 3, 4, 5, 6]
    );
    assert_eq!(tree.print_tree(), "(1 ((2 ((4 ()),(5 ()),)),(3 ((6 ()),)),))");
}

/// Complete graph on three vertices.
fn k3(n: &u32) -> Vec<u32> {
    (0..3).filter(|m| m != n).collect()
}

#[test]
fn cycle_killer_stops_at_seen_vertices() {
    let mut visitor = CycleKiller::new(PrettyPrinter::new(), NodeAlreadyVisitedTracker::default());
    visit(0u32, &k3, &mut visitor);
    let (printer, _) = visitor.into_inner();
    assert_eq!(printer.lines(), vec!["0 -- 0", "  1 -- 1", "    2 -- 2"]);
}

#[test]
fn level_limiting_stops_descent() {
    let cycle = |n: &u32| vec![(n + 1) % 3];
    let mut visitor = LevelLimitingVisitor::new(PrettyPrinter::new(), 5);
    visit(0u32, &cycle, &mut visitor);
    let printer = visitor.into_inner();
    assert_eq!(printer.lines().len(), 5);
    assert_eq!(printer.lines()[4], "        4 -- 1");
}

#[test]
fn decorators_compose() {
    // the tracker alone would allow depth 2 on K_3; the level limit cuts it to 1
    let mut visitor = LevelLimitingVisitor::new(
        CycleKiller::new(TreeBuilder::new(), NodeAlreadyVisitedTracker::default()),
        2,
    );
    visit(0u32, &k3, &mut visitor);
    let (builder, _) = visitor.into_inner().into_inner();
    let tree = builder.into_tree().unwrap();
    assert_eq!(tree.len(), 3);
    assert_eq!(tree.depth(), 1);
}

#[test]
fn build_tree_places_every_node_at_its_shortest_distance() {
    // K_3 has every vertex one hop from the root
    let tree = build_tree(0u32, &k3, NodeAlreadyVisitedTracker::default(), 10).unwrap();
    assert_eq!(tree.len(), 3);
    assert_eq!(tree.depth(), 1);

    // a -> b, a -> c, b -> c, c -> d
    let diamond = |n: &char| match n {
        'a' => vec!['b', 'c'],
        'b' => vec!['c'],
        'c' => vec!['d'],
        _ => vec![],
    };
    let tree = build_tree('a', &diamond, NodeAlreadyVisitedTracker::default(), 2).unwrap();
    let nodes: Vec<(char, usize)> = tree.iter().map(|e| (*e.value(), e.distance())).collect();
    assert_eq!(nodes, vec![('a', 0), ('b', 1), ('c', 1), ('d', 2)]);
    assert_eq!(tree.print_tree(), "(a ((b ()),(c ((d ()),)),))");

    let tree = build_tree('a', &diamond, NodeAlreadyVisitedTracker::default(), 1).unwrap();
    assert_eq!(tree.len(), 3);
}

#[test]
fn build_tree_on_a_seen_root_is_empty() {
    let mut tracker = NodeAlreadyVisitedTracker::default();
    tracker.has_occurred(&0u32);
    assert!(build_tree(0u32, &k3, tracker, 3).is_none());
}

#[test]
fn vertex_tracker_terminates_on_k3_edges() {
    // elements are (edge, vertex); the same vertex over a different edge is still a repeat
    let viewer = |(_, n): &((u32, u32), u32)| -> Vec<((u32, u32), u32)> {
        (0..3).filter(|m| m != n).map(|m| ((*n, m), m)).collect()
    };
    let mut tracker: VertexAlreadyVisitedTracker<(u32, u32), u32> = Default::default();
    let walked: Vec<u32> = bfs_walk_tracked(((0, 0), 0), &viewer, &mut tracker)
        .map(|e| e.value().1)
        .collect();
    assert_eq!(walked, vec![0, 1, 2]);
    assert_eq!(tracker.arrivals(&2), &[(0, 2), (1, 2)]);
}
