//! pfem1d
//! ======
//!
//! Parallel Legendre transforms on one-dimensional finite element meshes.
//!
//! Every operation takes a [`WorkerPool`](pool::WorkerPool) that the caller keeps alive across
//! many calls. An operation validates its buffers, splits the elements of the mesh into one
//! contiguous block per worker, dispatches the blocks to the pool and blocks until every worker
//! has finished. Operations that combine results across blocks (norms and the assembly of shared
//! interface values) do so on the calling thread after the workers are done, in increasing
//! element order. Repeated calls on the same pool are therefore bit-identical, and all
//! operations except the norm produce the same bits for every number of workers.
//!
//! ```rust
//! use pfem1d::assembly::{parallel_broken_to_continuous, parallel_continuous_to_broken};
//! use pfem1d::pool::WorkerPool;
//!
//! # fn main() -> pfem1d::Result<()> {
//! let pool = WorkerPool::new(3)?;
//! let degree = 2;
//! let num_elements = 4;
//!
//! // A continuous vector of FEM-basis coefficients has num_elements * degree + 1 entries
//! let continuous: Vec<f64> = (0..num_elements * degree + 1).map(|i| i as f64).collect();
//! let mut broken = vec![0.0; num_elements * (degree + 1)];
//! parallel_continuous_to_broken(degree, &continuous, &mut broken, &pool)?;
//!
//! let mut recovered = vec![0.0; continuous.len()];
//! parallel_broken_to_continuous(degree, &broken, &mut recovered, &pool)?;
//! for (a, b) in continuous.iter().zip(&recovered) {
//!     assert!((a - b).abs() < 1e-12);
//! }
//! # Ok(())
//! # }
//! ```

pub mod assembly;
pub mod error;
pub mod kernel;
pub mod layout;
pub mod partition;
pub mod pool;
pub mod reduction;
pub mod scalar;
pub mod serial;
pub mod transform;
pub mod workspace;

pub use error::{Error, OperationKind, Result};
pub use scalar::{Real, Scalar};

pub extern crate nalgebra;
