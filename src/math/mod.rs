pub mod fixed_point;
pub mod swap_math;
pub mod tick_math;
