//! Property tests over small random fact/rule sets (`spec.md` §8, P1-P4, P9).
//!
//! P5 (forbidden-id guard) lives in `solver.rs`/`tests/scenarios.rs`, P6 (set
//! discipline) in `wire.rs`/`term.rs`, P7 (symbol disjointness) in
//! `token.rs`, and P8 (envelope tamper detection) in `crypto.rs`/`token.rs` —
//! each is a narrow, deterministic unit test rather than a property, so they
//! stay colocated with the code they pin down.

use std::collections::HashSet;
use std::time::Duration;

use proptest::prelude::*;

use warrant::world::{RunLimits, World};
use warrant::{Fact, Predicate, Rule, SymbolTable, Term};

const EDGE: u64 = 1;
const REACHABLE: u64 = 2;

fn fact(name: u64, terms: Vec<Term>) -> Fact {
    Fact::new(Predicate::new(name, terms)).unwrap()
}

/// `reachable(x, y) <- edge(x, y)`, `reachable(x, z) <- edge(x, y), reachable(y, z)`.
/// Transitive closure over whatever edge set a test supplies.
fn transitive_closure_rules() -> Vec<Rule> {
    vec![
        Rule::new(
            Predicate::new(REACHABLE, vec![Term::Variable(0), Term::Variable(1)]),
            vec![Predicate::new(EDGE, vec![Term::Variable(0), Term::Variable(1)])],
            vec![],
        ),
        Rule::new(
            Predicate::new(REACHABLE, vec![Term::Variable(0), Term::Variable(2)]),
            vec![
                Predicate::new(EDGE, vec![Term::Variable(0), Term::Variable(1)]),
                Predicate::new(REACHABLE, vec![Term::Variable(1), Term::Variable(2)]),
            ],
            vec![],
        ),
    ]
}

fn world_with_edges(edges: &[(i64, i64)]) -> World {
    let mut world = World::new(RunLimits::unbounded_for_tests());
    for (a, b) in edges {
        world.facts.insert(fact(EDGE, vec![Term::Integer(*a), Term::Integer(*b)]));
    }
    world.rules = transitive_closure_rules();
    world
}

/// Brute-force transitive closure over a small node set, used as the oracle
/// against which the solver's output is checked.
fn brute_force_closure(edges: &[(i64, i64)]) -> HashSet<(i64, i64)> {
    let mut reach: HashSet<(i64, i64)> = edges.iter().copied().collect();
    loop {
        let mut added = Vec::new();
        for &(a, b) in &reach {
            for &(c, d) in &reach {
                if b == c && !reach.contains(&(a, d)) {
                    added.push((a, d));
                }
            }
        }
        if added.is_empty() {
            return reach;
        }
        reach.extend(added);
    }
}

fn small_edge_list() -> impl Strategy<Value = Vec<(i64, i64)>> {
    prop::collection::vec((0i64..6, 0i64..6), 0..12)
}

proptest! {
    /// P1: saturation computes exactly the transitive closure of a random
    /// edge relation, no more and no less.
    #[test]
    fn p1_closure_matches_brute_force(edges in small_edge_list()) {
        let symbols = SymbolTable::new();
        let mut world = world_with_edges(&edges);
        world.run(&symbols).unwrap();

        let got: HashSet<(i64, i64)> = world
            .query(&Predicate::new(REACHABLE, vec![Term::Variable(0), Term::Variable(1)]))
            .into_iter()
            .map(|f| {
                let terms = &f.predicate().terms;
                let (Term::Integer(a), Term::Integer(b)) = (&terms[0], &terms[1]) else {
                    unreachable!()
                };
                (*a, *b)
            })
            .collect();

        prop_assert_eq!(got, brute_force_closure(&edges));
    }

    /// P2: monotonicity — adding facts to a saturated world never removes a
    /// previously-derived fact from the next saturation's result.
    #[test]
    fn p2_adding_facts_only_grows_the_closure(
        edges in small_edge_list(),
        extra in (0i64..6, 0i64..6),
    ) {
        let symbols = SymbolTable::new();

        let mut before = world_with_edges(&edges);
        before.run(&symbols).unwrap();
        let before_set: HashSet<_> = before
            .query(&Predicate::new(REACHABLE, vec![Term::Variable(0), Term::Variable(1)]))
            .into_iter()
            .map(|f| f.predicate().terms.clone())
            .collect();

        let mut extended = edges.clone();
        extended.push(extra);
        let mut after = world_with_edges(&extended);
        after.run(&symbols).unwrap();
        let after_set: HashSet<_> = after
            .query(&Predicate::new(REACHABLE, vec![Term::Variable(0), Term::Variable(1)]))
            .into_iter()
            .map(|f| f.predicate().terms.clone())
            .collect();

        prop_assert!(before_set.is_subset(&after_set));
    }

    /// P3: fixed point — running saturation again on an already-saturated
    /// world adds nothing further.
    #[test]
    fn p3_saturating_twice_is_idempotent(edges in small_edge_list()) {
        let symbols = SymbolTable::new();
        let mut world = world_with_edges(&edges);
        world.run(&symbols).unwrap();
        let once = world.facts.len();
        world.run(&symbols).unwrap();
        prop_assert_eq!(world.facts.len(), once);
    }

    /// P4: determinism — two independent runs over identical input produce
    /// identical output, in the same enumeration order.
    #[test]
    fn p4_identical_input_yields_identical_output(edges in small_edge_list()) {
        let symbols = SymbolTable::new();
        let mut a = world_with_edges(&edges);
        let mut b = world_with_edges(&edges);
        a.run(&symbols).unwrap();
        b.run(&symbols).unwrap();

        let a_facts: Vec<_> = a.facts.iter().map(|f| f.predicate().clone()).collect();
        let b_facts: Vec<_> = b.facts.iter().map(|f| f.predicate().clone()).collect();
        prop_assert_eq!(a_facts, b_facts);
    }

    /// P9: a world whose edge set keeps growing without bound is always
    /// stopped by `max_facts`, never allowed to run unbounded.
    #[test]
    fn p9_max_facts_always_halts_unbounded_growth(n in 6usize..40) {
        // A cyclic edge set among `n` nodes: the closure is the complete
        // graph, which for n >= a few nodes blows well past a small cap.
        let edges: Vec<(i64, i64)> = (0..n as i64).map(|i| (i, (i + 1) % n as i64)).collect();
        let mut world = World::new(RunLimits {
            max_facts: 10,
            max_iterations: 1000,
            max_duration: Duration::from_secs(5),
        });
        for (a, b) in &edges {
            world.facts.insert(fact(EDGE, vec![Term::Integer(*a), Term::Integer(*b)]));
        }
        world.rules = transitive_closure_rules();

        let result = world.run(&SymbolTable::new());
        prop_assert!(result.is_err());
        prop_assert!(world.facts.len() >= 10);
    }
}
