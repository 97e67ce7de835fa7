pub mod big_num;
pub mod bit_math;
pub mod fixed_point_128;
pub mod fixed_point_96;
pub mod full_math;
pub mod liquidity_math;
pub mod sqrt_price_math;
pub mod swap_math;
pub mod tick_math;
pub mod unsafe_math;

pub use big_num::*;
pub use full_math::*;
pub use swap_math::*;
pub use unsafe_math::*;
