/// Implements the arithmetic operator traits for single-field newtype wrappers by delegating to the wrapped value.
///
/// * `op!(binary Type, Add, add)` implements `Add<Type> for Type`
/// * `op!(inplace Type, AddAssign, add_assign)` implements `AddAssign<Type> for Type`
#[macro_export]
macro_rules! op {
    (binary $type:ty, $trait:ident, $fn:ident) => {
        impl std::ops::$trait for $type {
            type Output = Self;

            fn $fn(self, rhs: Self) -> Self::Output {
                Self(std::ops::$trait::$fn(self.0, rhs.0))
            }
        }
    };
    (inplace $type:ty, $trait:ident, $fn:ident) => {
        impl std::ops::$trait for $type {
            fn $fn(&mut self, rhs: Self) {
                std::ops::$trait::$fn(&mut self.0, rhs.0)
            }
        }
    };
}
