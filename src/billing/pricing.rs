/// Amounts of the single billed line.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Charge {
    /// Billed hours.
    pub quantity: f64,
    pub unit_price: f64,
    /// `quantity * unit_price`, rounded to cents.
    pub total: f64,
}

impl Charge {
    /// Bills whole hours of `total_minutes` at the company price when it is
    /// positive, at `fallback_price` otherwise.
    pub fn compute(
        total_minutes: i64,
        company_price: Option<f64>,
        fallback_price: f64,
    ) -> Self {
        let quantity = billed_hours(total_minutes) as f64;
        let unit_price = company_price
            .filter(|p| p.is_finite() && *p > 0.0)
            .unwrap_or(fallback_price);
        Self {
            quantity,
            unit_price,
            total: round_cents(quantity * unit_price),
        }
    }
}

/// Hours to bill for `total_minutes` of work: started hours count fully and
/// at least one hour is billed.
pub fn billed_hours(total_minutes: i64) -> i64 {
    if total_minutes <= 0 {
        1
    } else {
        (total_minutes + 59) / 60
    }
}

fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_started_hours_up() {
        assert_eq!(billed_hours(0), 1);
        assert_eq!(billed_hours(1), 1);
        assert_eq!(billed_hours(60), 1);
        assert_eq!(billed_hours(61), 2);
        assert_eq!(billed_hours(150), 3);
    }

    #[test]
    fn prefers_positive_company_price() {
        let charge = Charge::compute(90, Some(99.9), 150.0);
        assert_eq!(charge.quantity, 2.0);
        assert_eq!(charge.unit_price, 99.9);
        assert_eq!(charge.total, 199.8);

        assert_eq!(Charge::compute(90, Some(0.0), 150.0).unit_price, 150.0);
        assert_eq!(Charge::compute(90, None, 150.0).total, 300.0);
    }
}
