//! Execution context
//!
//! The reconstruction never touches global device state. Callers choose where
//! data-parallel work runs and pass the context down the call chain.

use std::sync::Arc;

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::Result;

#[derive(Clone)]
enum Mode {
    Sequential,
    Global,
    Pool(Arc<ThreadPool>),
}

/// Where data-parallel work (per plane, per coil, per sample) is executed.
#[derive(Clone)]
pub struct ExecutionContext {
    mode: Mode,
}

impl ExecutionContext {
    /// Run everything on the calling thread.
    pub fn sequential() -> Self {
        Self { mode: Mode::Sequential }
    }

    /// Use rayon's global thread pool.
    pub fn global() -> Self {
        Self { mode: Mode::Global }
    }

    /// Build a dedicated pool with `threads` workers.
    pub fn with_threads(threads: usize) -> Result<Self> {
        let pool = ThreadPoolBuilder::new().num_threads(threads).build()?;
        Ok(Self { mode: Mode::Pool(Arc::new(pool)) })
    }

    /// Apply `f(index, chunk)` to consecutive chunks of `chunk_len` elements.
    pub fn for_each_chunk<T, F>(&self, data: &mut [T], chunk_len: usize, f: F)
    where
        T: Send,
        F: Fn(usize, &mut [T]) + Send + Sync,
    {
        if chunk_len == 0 {
            return;
        }
        match &self.mode {
            Mode::Sequential => {
                for (i, chunk) in data.chunks_mut(chunk_len).enumerate() {
                    f(i, chunk);
                }
            }
            Mode::Global => {
                data.par_chunks_mut(chunk_len)
                    .enumerate()
                    .for_each(|(i, chunk)| f(i, chunk));
            }
            Mode::Pool(pool) => pool.install(|| {
                data.par_chunks_mut(chunk_len)
                    .enumerate()
                    .for_each(|(i, chunk)| f(i, chunk));
            }),
        }
    }

    /// Evaluate `f(i)` for `i in 0..n` and collect the results in order.
    pub fn map_indices<R, F>(&self, n: usize, f: F) -> Vec<R>
    where
        R: Send,
        F: Fn(usize) -> R + Send + Sync,
    {
        match &self.mode {
            Mode::Sequential => (0..n).map(f).collect(),
            Mode::Global => (0..n).into_par_iter().map(f).collect(),
            Mode::Pool(pool) => pool.install(|| (0..n).into_par_iter().map(f).collect()),
        }
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::global()
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = match &self.mode {
            Mode::Sequential => "sequential".to_string(),
            Mode::Global => "global".to_string(),
            Mode::Pool(pool) => format!("pool({})", pool.current_num_threads()),
        };
        f.debug_struct("ExecutionContext").field("mode", &mode).finish()
    }
}
