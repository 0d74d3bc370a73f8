use serde::Serialize;
use tracing::info;

use crate::commit::{CommitDriver, RunContext};
use crate::error::BridgeError;
use crate::graph::{FieldMapping, GraphBuilder};
use crate::source::Row;
use crate::store::MappingStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    pub rows: usize,
    pub chunks: usize,
}

/// Folds `rows` into identifier graphs and commits them into `store`.
///
/// Without a chunk size the whole input becomes one graph. With one, the graph
/// is flushed and cleared every `chunk_size` rows; the remainder is flushed at
/// the end. The first failing row or store write aborts the load.
pub fn load_rows<I, S>(
    rows: I,
    mapping: &FieldMapping,
    chunk_size: Option<usize>,
    store: &mut S,
    context: &mut RunContext,
) -> Result<LoadSummary, BridgeError>
where
    I: IntoIterator<Item = Result<Row, BridgeError>>,
    S: MappingStore + ?Sized,
{
    let chunk_size = chunk_size.filter(|size| *size > 0);
    let mut builder = GraphBuilder::new(mapping.clone());
    let mut driver = CommitDriver::new(store, context).with_attribute(mapping.attribute_name());
    let mut pending = 0usize;
    let mut chunks = 0usize;

    for row in rows {
        builder.add_row(&row?)?;
        pending += 1;
        if Some(pending) == chunk_size {
            chunks += 1;
            let graph = builder.take();
            info!(
                chunk = chunks,
                rows = builder.rows_seen(),
                primaries = graph.len(),
                "flushing chunk"
            );
            driver.flush(&graph)?;
            pending = 0;
        }
    }

    if pending > 0 {
        chunks += 1;
        let graph = builder.take();
        info!(
            chunk = chunks,
            rows = builder.rows_seen(),
            primaries = graph.len(),
            "flushing"
        );
        driver.flush(&graph)?;
    }

    Ok(LoadSummary {
        rows: builder.rows_seen(),
        chunks,
    })
}
