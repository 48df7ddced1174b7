/// Where a single checkout attempt is. One attempt is one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutStage {
    Started,
    Validating,
    Pricing,
    Reserving,
    Charging,
    Persisting,
    Committed,
    Aborted,
}

impl CheckoutStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutStage::Started => "started",
            CheckoutStage::Validating => "validating",
            CheckoutStage::Pricing => "pricing",
            CheckoutStage::Reserving => "reserving",
            CheckoutStage::Charging => "charging",
            CheckoutStage::Persisting => "persisting",
            CheckoutStage::Committed => "committed",
            CheckoutStage::Aborted => "aborted",
        }
    }

    /// True once stock or credit may have been touched inside the transaction.
    pub fn has_mutated(&self) -> bool {
        matches!(
            self,
            CheckoutStage::Reserving | CheckoutStage::Charging | CheckoutStage::Persisting
        )
    }
}

impl core::fmt::Display for CheckoutStage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
