//! Query result surfaces.

use crate::construct::ConstructStream;
use crate::error::Result;
use crate::pipeline::{self, SolutionStream};
use futures::future::BoxFuture;
use futures::StreamExt;
use rivulet_core::{Bindings, Triple};

/// What a built query produces.
///
/// SELECT yields solution mappings, CONSTRUCT and the DESCRIBE
/// rewrite yield triples, ASK yields one boolean.
pub enum QueryResults {
    Bindings(SolutionStream),
    Triples(ConstructStream),
    Boolean(BoxFuture<'static, Result<bool>>),
}

impl QueryResults {
    /// Drain a SELECT result into a vector.
    pub async fn all_bindings(self) -> Result<Vec<Bindings>> {
        match self {
            QueryResults::Bindings(stream) => pipeline::collect(stream).await,
            _ => Err(crate::error::QueryError::InvalidQuery(
                "query does not produce solution mappings".into(),
            )),
        }
    }

    /// Drain a CONSTRUCT / DESCRIBE result into a vector.
    pub async fn all_triples(self) -> Result<Vec<Triple>> {
        match self {
            QueryResults::Triples(mut stream) => {
                let mut out = Vec::new();
                while let Some(item) = stream.next().await {
                    out.push(item?);
                }
                Ok(out)
            }
            _ => Err(crate::error::QueryError::InvalidQuery(
                "query does not produce triples".into(),
            )),
        }
    }

    /// Resolve an ASK result.
    pub async fn boolean(self) -> Result<bool> {
        match self {
            QueryResults::Boolean(future) => future.await,
            _ => Err(crate::error::QueryError::InvalidQuery(
                "query does not produce a boolean".into(),
            )),
        }
    }
}
