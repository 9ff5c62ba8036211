//! Search helpers shared by the motif solvers.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::quantity::{Quantity, QuantityError};

pub(crate) const TWO_PI: Decimal = dec!(6.283185307179586476925286767);

/// Where a target lands in an increasing series: the first value at or above it and the
/// value just before that one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bracket {
    pub previous: Option<Quantity>,
    pub crossing: Quantity,
}

impl Bracket {
    /// Largest series value not above `target`.
    pub fn at_or_below(&self, target: &Quantity) -> Option<Quantity> {
        if self.crossing.value() == target.value() {
            Some(self.crossing)
        } else {
            self.previous
        }
    }

    /// The value one step below the crossing, or the crossing itself when it is the first
    /// value of the series.
    pub fn lower(&self) -> Quantity {
        self.previous.unwrap_or(self.crossing)
    }
}

/// Walk `values` until one reaches `target`.
pub fn bracket<I>(values: I, target: &Quantity) -> Option<Bracket>
where
    I: IntoIterator<Item = Quantity>,
{
    let mut previous = None;
    for value in values {
        if value.value() >= target.value() {
            return Some(Bracket {
                previous,
                crossing: value,
            });
        }
        previous = Some(value);
    }
    None
}

/// First value strictly above `target`.
pub fn first_above<I>(values: I, target: &Quantity) -> Option<Quantity>
where
    I: IntoIterator<Item = Quantity>,
{
    values.into_iter().find(|v| v.value() > target.value())
}

/// Candidate with the smallest error. The first of several equal minima wins.
pub fn min_by_error<T, I, F>(candidates: I, mut error: F) -> Result<Option<T>, QuantityError>
where
    I: IntoIterator<Item = T>,
    F: FnMut(&T) -> Result<Decimal, QuantityError>,
{
    let mut best: Option<(Decimal, T)> = None;
    for candidate in candidates {
        let err = error(&candidate)?;
        if best.as_ref().is_none_or(|(best_err, _)| err < *best_err) {
            best = Some((err, candidate));
        }
    }
    Ok(best.map(|(_, candidate)| candidate))
}

pub(crate) fn checked_div(numerator: Decimal, denominator: Decimal) -> Result<Decimal, QuantityError> {
    numerator
        .checked_div(denominator)
        .ok_or(QuantityError::DivisionByZero)
}

/// `1 / (2π·a·b)`, the corner of an RC pair or the capacitance for a given R and frequency.
pub(crate) fn inverse_two_pi(a: Decimal, b: Decimal) -> Result<Decimal, QuantityError> {
    let product = a
        .checked_mul(b)
        .and_then(|p| p.checked_mul(TWO_PI))
        .ok_or(QuantityError::DivisionByZero)?;
    checked_div(Decimal::ONE, product)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quantity::QuantityKind;

    fn res(values: &[&str]) -> Vec<Quantity> {
        values
            .iter()
            .map(|v| Quantity::parse(QuantityKind::Resistance, v).unwrap())
            .collect()
    }

    fn r(s: &str) -> Quantity {
        Quantity::parse(QuantityKind::Resistance, s).unwrap()
    }

    #[test]
    fn bracket_tracks_previous() {
        let values = res(&["1K", "1.5K", "2.2K"]);
        let b = bracket(values.clone(), &r("1.2K")).unwrap();
        assert_eq!(b.crossing, r("1.5K"));
        assert_eq!(b.previous, Some(r("1K")));
        assert_eq!(b.at_or_below(&r("1.2K")), Some(r("1K")));

        let exact = bracket(values.clone(), &r("1.5K")).unwrap();
        assert_eq!(exact.at_or_below(&r("1.5K")), Some(r("1.5K")));

        let first = bracket(values.clone(), &r("10E")).unwrap();
        assert_eq!(first.previous, None);
        assert_eq!(first.lower(), r("1K"));

        assert_eq!(bracket(values, &r("3K")), None);
    }

    #[test]
    fn first_above_is_strict() {
        let values = res(&["1K", "1.5K", "2.2K"]);
        assert_eq!(first_above(values.clone(), &r("1.5K")), Some(r("2.2K")));
        assert_eq!(first_above(values, &r("2.2K")), None);
    }

    #[test]
    fn min_by_error_keeps_first_minimum() {
        let best = min_by_error([3, 5, 7], |v: &i32| Ok(Decimal::from((v - 4).abs()))).unwrap();
        assert_eq!(best, Some(3));
        let none = min_by_error(Vec::<i32>::new(), |_| Ok(Decimal::ZERO)).unwrap();
        assert_eq!(none, None);
    }

    #[test]
    fn rc_corner() {
        // 1 / (2π · 50 · 15000) ≈ 212.2nF
        let c = inverse_two_pi(dec!(50), dec!(15000)).unwrap();
        assert!(c > dec!(0.0000002122) && c < dec!(0.0000002123), "{c}");
        assert_eq!(
            inverse_two_pi(Decimal::ZERO, dec!(1)),
            Err(QuantityError::DivisionByZero)
        );
    }
}
