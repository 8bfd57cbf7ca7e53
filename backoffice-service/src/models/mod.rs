pub mod customer;
pub mod invoice;
pub mod product;
pub mod user;

pub use customer::{
    available_credit, Address, Customer, CustomerType, NewCustomer, PaymentMethod,
    PaymentRecord,
};
pub use invoice::{CustomerSnapshot, Invoice, InvoiceItem, InvoiceTotals, PaymentStatus};
pub use product::{NewProduct, Product, ProductCategory, Unit};
pub use user::{normalize_email, Role, User};

/// Round a money amount to two decimal places.
pub fn round_money(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Largest money amount accepted on input: one lakh crore rupees.
pub const MAX_MONEY: f64 = 1.0e12;

/// Round an input amount, rejecting anything non-finite, negative or above
/// [`MAX_MONEY`] once rounded.
pub fn checked_money(amount: f64) -> Option<f64> {
    let rounded = round_money(amount);
    (rounded.is_finite() && (0.0..=MAX_MONEY).contains(&rounded)).then_some(rounded)
}

/// `Option<DateTime<Utc>>` stored as a BSON date or null.
pub mod optional_bson_datetime {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(val: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match val {
            Some(date) => {
                mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime::serialize(
                    date, serializer,
                )
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Wrapper(
            #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
            DateTime<Utc>,
        );

        let wrapper = Option::<Wrapper>::deserialize(deserializer)?;
        Ok(wrapper.map(|w| w.0))
    }
}

#[cfg(test)]
mod tests {
    use super::{checked_money, round_money, MAX_MONEY};

    #[test]
    fn rounds_to_two_decimals() {
        assert_eq!(round_money(10.005_1), 10.01);
        assert_eq!(round_money(99.994), 99.99);
        assert_eq!(round_money(0.0), 0.0);
    }

    #[test]
    fn checked_money_rejects_amounts_that_overflow_when_rounded() {
        assert_eq!(checked_money(1e308), None);
        assert_eq!(checked_money(f64::INFINITY), None);
        assert_eq!(checked_money(f64::NAN), None);
        assert_eq!(checked_money(-0.5), None);
        assert_eq!(checked_money(MAX_MONEY + 1.0), None);
        assert_eq!(checked_money(MAX_MONEY), Some(MAX_MONEY));
        assert_eq!(checked_money(120.456), Some(120.46));
    }
}
