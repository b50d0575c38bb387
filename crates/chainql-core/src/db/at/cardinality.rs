use crate::db::response::ResponseError;
use derive_more::Display;

///
/// Cardinality
/// Row-count contract of an at-expression.
///

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum Cardinality {
    /// `@?`: at most one row.
    #[display("@?")]
    ZeroOne,

    /// `@`: exactly one row.
    #[display("@")]
    One,

    /// `@*`: any number of rows.
    #[display("@*")]
    ZeroMany,

    /// `@+`: at least one row.
    #[display("@+")]
    OneMany,
}

impl Cardinality {
    #[must_use]
    pub const fn allows_zero(self) -> bool {
        matches!(self, Self::ZeroOne | Self::ZeroMany)
    }

    #[must_use]
    pub const fn allows_many(self) -> bool {
        matches!(self, Self::ZeroMany | Self::OneMany)
    }

    /// Check an actual row count against the contract.
    pub const fn check(self, count: usize) -> Result<(), ResponseError> {
        if count == 0 && !self.allows_zero() {
            return Err(ResponseError::NotFound);
        }
        if count > 1 && !self.allows_many() {
            return Err(ResponseError::NotUnique {
                count: count as u64,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn any_cardinality() -> impl Strategy<Value = Cardinality> {
        prop_oneof![
            Just(Cardinality::ZeroOne),
            Just(Cardinality::One),
            Just(Cardinality::ZeroMany),
            Just(Cardinality::OneMany),
        ]
    }

    #[test]
    fn single_cardinalities_reject_many() {
        assert!(Cardinality::One.check(1).is_ok());
        assert!(matches!(
            Cardinality::One.check(0),
            Err(ResponseError::NotFound)
        ));
        assert!(matches!(
            Cardinality::ZeroOne.check(2),
            Err(ResponseError::NotUnique { count: 2 })
        ));
        assert!(Cardinality::ZeroOne.check(0).is_ok());
    }

    proptest! {
        #[test]
        fn check_matches_flags(card in any_cardinality(), count in 0usize..64) {
            let ok = (count != 0 || card.allows_zero()) && (count <= 1 || card.allows_many());

            prop_assert_eq!(card.check(count).is_ok(), ok);
        }

        #[test]
        fn violation_reports_actual_count(card in any_cardinality(), count in 0usize..64) {
            if let Err(err) = card.check(count) {
                prop_assert_eq!(err.code(), format!("at:wrong_count:{count}"));
            }
        }
    }
}
