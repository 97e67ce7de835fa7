//! 256 and 512 bit unsigned integers.
//!
//! U512 exists solely as the intermediate width for 256-bit mul-div, so
//! products of two Q64.96 / Q128.128 operands never phantom-overflow.

use uint::construct_uint;

construct_uint! {
    pub struct U256(4);
}

construct_uint! {
    pub struct U512(8);
}
