pub mod common_io; // gz-aware line readers and writers
pub mod dmatrix_io; // delimited text I/O for dense matrices
pub mod mtx_io; // MatrixMarket triplets
pub mod sparse_util; // triplet conversions for dense and sparse matrices
pub mod traits; // shared matrix traits
