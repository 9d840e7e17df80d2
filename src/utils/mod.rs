//! Numerical helpers shared by the backends.

pub mod finite_difference;
pub mod matrix_convert;

pub use finite_difference::{gradient, jacobian, jacobian_parallel, jacobian_with_steps, step_size};
pub use matrix_convert::{
    faer_vec_to_ndarray, nalgebra_to_ndarray, nalgebra_vec_to_ndarray, ndarray_to_faer,
    ndarray_to_nalgebra, ndarray_vec_to_faer, ndarray_vec_to_nalgebra,
};
