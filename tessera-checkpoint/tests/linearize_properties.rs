use rand::rngs::StdRng;
use rand::SeedableRng;
use tessera_checkpoint::linearize::linearize;
use tessera_checkpoint::{CheckpointSolverBase, SolverConfig};
use tessera_core::{NodeId, TesseraError};

mod common;
use common::{init_logger, random_profiled_graph};

#[test]
fn test_regions_partition_compute_nodes_in_order() -> Result<(), TesseraError> {
    init_logger();
    let mut rng = StdRng::seed_from_u64(0x7e55e7a);
    for _ in 0..200 {
        let g = random_profiled_graph(&mut rng, 3, 40)?;
        let lin = linearize(&g, &["input_0".to_string()])?;

        let flattened: Vec<NodeId> = lin.regions.iter().flatten().copied().collect();
        let expected: Vec<NodeId> = g
            .nodes()
            .filter(|n| !n.is_placeholder() && !n.is_output())
            .map(|n| n.id())
            .collect();
        assert_eq!(flattened, expected);
        assert!(lin.regions.iter().all(|r| !r.is_empty()));
    }
    Ok(())
}

#[test]
fn test_no_region_ends_on_a_value_mutated_in_place() -> Result<(), TesseraError> {
    init_logger();
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..200 {
        let g = random_profiled_graph(&mut rng, 2, 30)?;
        let lin = linearize(&g, &[])?;
        for region in &lin.regions {
            let last = region[region.len() - 1];
            assert!(
                !g.node(last).users().iter().any(|&u| g.is_inplace(u)),
                "region ending at {} has an in-place consumer",
                g.node(last).name()
            );
        }
    }
    Ok(())
}

#[test]
fn test_last_compute_node_closes_the_final_region() -> Result<(), TesseraError> {
    init_logger();
    let mut rng = StdRng::seed_from_u64(0xf1a5);
    for _ in 0..200 {
        let g = random_profiled_graph(&mut rng, 2, 30)?;
        let last_compute = g
            .nodes()
            .filter(|n| !n.is_placeholder() && !n.is_output())
            .last()
            .map(|n| n.id());
        let Some(last_compute) = last_compute else {
            continue;
        };
        // Only the output consumes it, so it never waits on a later user.
        assert!(g
            .node(last_compute)
            .users()
            .iter()
            .all(|&u| g.node(u).is_output() && !g.is_inplace(u)));

        let lin = linearize(&g, &[])?;
        assert_eq!(lin.regions.last().and_then(|r| r.last()), Some(&last_compute));
    }
    Ok(())
}

#[test]
fn test_common_set_only_grows() -> Result<(), TesseraError> {
    init_logger();
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..100 {
        let g = random_profiled_graph(&mut rng, 3, 25)?;
        let whitelist = vec!["input_1".to_string(), "input_2".to_string()];
        let lin = linearize(&g, &whitelist)?;

        // Whitelist first, then promotions in definition order.
        let names: Vec<&str> = lin.common_nodes.iter().map(|&id| g.node(id).name()).collect();
        assert_eq!(&names[..2], &["input_1", "input_2"]);
        assert!(lin.common_nodes[2..].windows(2).all(|w| w[0] < w[1]));

        // A promoted node only depends on common nodes or is a common op.
        for &id in &lin.common_nodes[2..] {
            let node = g.node(id);
            let inputs_common = node.inputs().iter().all(|p| lin.common_nodes.contains(p));
            assert!(inputs_common || node.target() == "getitem");
        }
    }
    Ok(())
}

#[test]
fn test_solver_base_matches_linearizer() -> Result<(), TesseraError> {
    init_logger();
    let mut rng = StdRng::seed_from_u64(1234);
    let g = random_profiled_graph(&mut rng, 2, 50)?;

    let lin = linearize(&g, &[])?;
    let base = CheckpointSolverBase::new(&g, SolverConfig::default().with_linearize(true))?;
    assert_eq!(base.node_list(), lin.regions.as_slice());
    Ok(())
}
