//! Line and order price arithmetic. All amounts are two-decimal `Decimal`s;
//! rounding happens once, on the order total.

use rust_decimal::Decimal;

/// Price-relevant fields of a product at the moment of ordering.
#[derive(Debug, Clone, Copy)]
pub struct ProductPrice {
    pub price: Decimal,
    pub discounted_price: Option<Decimal>,
}

impl ProductPrice {
    pub fn base(&self) -> Decimal {
        self.discounted_price.unwrap_or(self.price)
    }
}

/// Unit price for one line: discounted (or list) price plus every variant
/// modifier that applies to the selection.
pub fn line_unit_price(product: ProductPrice, modifiers: &[Decimal]) -> Decimal {
    modifiers
        .iter()
        .fold(product.base(), |acc, modifier| acc + modifier)
}

pub fn line_sub_total(unit_price: Decimal, quantity: i32) -> Decimal {
    unit_price * Decimal::from(quantity)
}

pub fn order_total<I>(sub_totals: I, shipping_cost: Decimal, tax_amount: Decimal) -> Decimal
where
    I: IntoIterator<Item = Decimal>,
{
    let lines: Decimal = sub_totals.into_iter().sum();
    (lines + shipping_cost + tax_amount).round_dp(2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(value: &str) -> Decimal {
        Decimal::from_str(value).unwrap()
    }

    #[test]
    fn discounted_price_wins_over_list_price() {
        let product = ProductPrice {
            price: dec("120.00"),
            discounted_price: Some(dec("99.50")),
        };
        assert_eq!(line_unit_price(product, &[]), dec("99.50"));
    }

    #[test]
    fn modifiers_are_added_to_base() {
        let product = ProductPrice {
            price: dec("50.00"),
            discounted_price: None,
        };
        assert_eq!(line_unit_price(product, &[dec("2.50")]), dec("52.50"));
        assert_eq!(
            line_unit_price(product, &[dec("2.50"), dec("-1.00")]),
            dec("51.50")
        );
    }

    #[test]
    fn total_adds_shipping_and_tax() {
        let lines = [
            line_sub_total(dec("7500"), 2),
            line_sub_total(dec("5000"), 1),
        ];
        let total = order_total(lines, dec("1500"), dec("500"));
        assert_eq!(total, dec("22000"));
    }

    #[test]
    fn rounding_happens_on_the_total_only() {
        // Three lines of 0.333 would lose a cent each if rounded per line.
        let lines = [dec("0.333"), dec("0.333"), dec("0.334")];
        assert_eq!(order_total(lines, Decimal::ZERO, Decimal::ZERO), dec("1.00"));
    }

    #[test]
    fn empty_lines_total_is_shipping_plus_tax() {
        assert_eq!(
            order_total(Vec::new(), dec("10.00"), dec("0.75")),
            dec("10.75")
        );
    }
}
