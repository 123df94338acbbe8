use once_cell::sync::OnceCell;
use rand::Rng;
use std::sync::Arc;
use tessera_core::{Graph, MetaValue, NodeId, OwningModule, TesseraError};

static LOGGER_INITIALIZED: OnceCell<()> = OnceCell::new();

#[allow(dead_code)]
pub(crate) fn init_logger() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// Builds a random DAG: `inputs` placeholders, then `ops` compute nodes each
/// consuming one to three earlier nodes. Roughly one node in five is in place,
/// one in ten is a `getitem`. Every node gets profiling metadata.
#[allow(dead_code)]
pub(crate) fn random_profiled_graph<R: Rng>(
    rng: &mut R,
    inputs: usize,
    ops: usize,
) -> Result<Graph, TesseraError> {
    let module = Arc::new(OwningModule::new("random").with_submodule("block_inplace", true));
    let mut g = Graph::with_owning_module(module);
    let mut ids: Vec<NodeId> = Vec::new();
    for i in 0..inputs {
        ids.push(g.placeholder(&format!("input_{}", i))?);
    }
    for i in 0..ops {
        let fan_in = rng.gen_range(1..=3usize.min(ids.len()));
        let args: Vec<NodeId> = (0..fan_in)
            .map(|_| ids[rng.gen_range(0..ids.len())])
            .collect();
        let name = format!("op_{}", i);
        let id = match rng.gen_range(0..10) {
            0 | 1 => g.call_function_inplace(&name, "add", &args)?,
            2 => g.call_module(&name, "block_inplace", &args)?,
            3 => g.call_function(&name, "getitem", &args)?,
            4 => g.call_method(&name, "view", &args)?,
            _ => g.call_function(&name, "mul", &args)?,
        };
        ids.push(id);
    }
    let last = ids[ids.len() - 1];
    g.output(&[last])?;

    let all: Vec<NodeId> = g.node_ids().collect();
    for id in all {
        g.set_meta(id, "fwd_mem_out", MetaValue::Int(rng.gen_range(1..1024)))?;
    }
    Ok(g)
}
