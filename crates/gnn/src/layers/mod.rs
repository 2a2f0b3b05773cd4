//! MTGNN 的网络层

pub mod graph;
pub mod norm;
pub mod propagation;
pub mod temporal;

pub use graph::GraphConstructor;
pub use norm::LayerNorm;
pub use propagation::{dy_nconv, nconv, DyMixPropagation, Linear, MixPropagation, Propagation};
pub use temporal::{Dilated1D, DilatedInception, KERNEL_SET, MAX_KERNEL};
