//! The `base` crate defines the MIX-related things which are useful
//! in both a simulator and other associated tools.  The idea is that
//! if you want to write an assembler, it would depend on the base
//! crate but would not need to depend on the simulator library
//! itself.

pub mod charset;
pub mod instruction;
pub mod prelude;
pub mod word;

/// Build a [`word::Word`] from a sign token and five byte values.
///
/// ```
/// use base::word;
/// let w = word!(- 1, 16, 3, 5, 4);
/// assert_eq!(w.byte(2), 16);
/// assert!(w.is_negative());
/// ```
#[macro_export]
macro_rules! word {
    (+ $b1:expr, $b2:expr, $b3:expr, $b4:expr, $b5:expr) => {
        $crate::word::Word::from_bytes($crate::word::Sign::Plus, [$b1, $b2, $b3, $b4, $b5])
    };
    (- $b1:expr, $b2:expr, $b3:expr, $b4:expr, $b5:expr) => {
        $crate::word::Word::from_bytes($crate::word::Sign::Minus, [$b1, $b2, $b3, $b4, $b5])
    };
}
