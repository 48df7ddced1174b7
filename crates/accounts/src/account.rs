use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use dualmart_core::{AccountId, Document, DomainError, DomainResult, Entity, Money, PricingTier};

use crate::credit::{CreditCharge, CreditError};

/// Account status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Pending,
    Active,
    Suspended,
    Inactive,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Pending => "pending",
            AccountStatus::Active => "active",
            AccountStatus::Suspended => "suspended",
            AccountStatus::Inactive => "inactive",
        }
    }
}

impl core::fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment terms; each maps to a number of net days until payment is due.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentTerms {
    #[default]
    Immediate,
    Net15,
    Net30,
    Net45,
    Net60,
}

impl PaymentTerms {
    pub fn net_days(&self) -> u32 {
        match self {
            PaymentTerms::Immediate => 0,
            PaymentTerms::Net15 => 15,
            PaymentTerms::Net30 => 30,
            PaymentTerms::Net45 => 45,
            PaymentTerms::Net60 => 60,
        }
    }

    pub fn due_date(&self, placed_at: DateTime<Utc>) -> DateTime<Utc> {
        placed_at + Duration::days(i64::from(self.net_days()))
    }
}

/// Orders at or above `threshold` need manual approval when `required` is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ApprovalPolicy {
    pub required: bool,
    pub threshold: Money,
}

impl ApprovalPolicy {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn above(threshold: Money) -> Self {
        Self {
            required: true,
            threshold,
        }
    }

    pub fn requires_approval(&self, order_total: Money) -> bool {
        self.required && order_total >= self.threshold
    }
}

/// A business buyer.
///
/// `credit_used` only grows through [`WholesaleAccount::charge_credit`]; a
/// `credit_limit` of zero means no limit is enforced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WholesaleAccount {
    id: AccountId,
    business_name: String,
    status: AccountStatus,
    tier: PricingTier,
    #[serde(default)]
    payment_terms: PaymentTerms,
    credit_limit: Money,
    credit_used: Money,
    #[serde(default)]
    approval: ApprovalPolicy,
    #[serde(default)]
    version: u64,
}

impl WholesaleAccount {
    /// New registration, pending administrator approval.
    pub fn register(
        id: AccountId,
        business_name: impl Into<String>,
        tier: PricingTier,
        payment_terms: PaymentTerms,
        credit_limit: Money,
    ) -> DomainResult<Self> {
        let business_name = business_name.into();
        if business_name.trim().is_empty() {
            return Err(DomainError::validation("business name cannot be empty"));
        }
        Ok(Self {
            id,
            business_name,
            status: AccountStatus::Pending,
            tier,
            payment_terms,
            credit_limit,
            credit_used: Money::ZERO,
            approval: ApprovalPolicy::none(),
            version: 0,
        })
    }

    pub fn with_approval_policy(mut self, approval: ApprovalPolicy) -> Self {
        self.approval = approval;
        self
    }

    /// Seed the used-credit counter (migration / fixtures).
    pub fn with_credit_used(mut self, used: Money) -> DomainResult<Self> {
        if !self.credit_limit.is_zero() && used > self.credit_limit {
            return Err(DomainError::invariant(format!(
                "credit used {used} exceeds limit {}",
                self.credit_limit
            )));
        }
        self.credit_used = used;
        Ok(self)
    }

    pub fn id_typed(&self) -> AccountId {
        self.id
    }

    pub fn business_name(&self) -> &str {
        &self.business_name
    }

    pub fn status(&self) -> AccountStatus {
        self.status
    }

    pub fn tier(&self) -> PricingTier {
        self.tier
    }

    pub fn payment_terms(&self) -> PaymentTerms {
        self.payment_terms
    }

    pub fn credit_limit(&self) -> Money {
        self.credit_limit
    }

    pub fn credit_used(&self) -> Money {
        self.credit_used
    }

    pub fn approval_policy(&self) -> ApprovalPolicy {
        self.approval
    }

    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    pub fn has_credit_limit(&self) -> bool {
        !self.credit_limit.is_zero()
    }

    /// `limit − used`, floored at zero.
    pub fn available_credit(&self) -> Money {
        self.credit_limit.saturating_sub(self.credit_used)
    }

    pub fn requires_approval(&self, order_total: Money) -> bool {
        self.approval.requires_approval(order_total)
    }

    pub fn ensure_active(&self) -> Result<(), CreditError> {
        if self.is_active() {
            Ok(())
        } else {
            Err(CreditError::InactiveAccount {
                status: self.status,
            })
        }
    }

    /// Add `amount` to the used-credit counter.
    ///
    /// Requires an active account and, when a limit is set, enough available
    /// credit. A charge equal to the available credit succeeds.
    pub fn charge_credit(&mut self, amount: Money) -> Result<CreditCharge, CreditError> {
        self.ensure_active()?;

        if self.has_credit_limit() {
            let available = self.available_credit();
            if amount > available {
                return Err(CreditError::InsufficientCredit {
                    requested: amount,
                    available,
                });
            }
        }

        self.credit_used = self.credit_used.checked_add(amount)?;
        Ok(CreditCharge {
            amount,
            credit_used: self.credit_used,
            remaining: self.has_credit_limit().then(|| self.available_credit()),
        })
    }

    pub fn approve(&mut self) -> DomainResult<()> {
        self.transition(&[AccountStatus::Pending], AccountStatus::Active)
    }

    pub fn suspend(&mut self) -> DomainResult<()> {
        self.transition(&[AccountStatus::Active], AccountStatus::Suspended)
    }

    pub fn reactivate(&mut self) -> DomainResult<()> {
        self.transition(
            &[AccountStatus::Suspended, AccountStatus::Inactive],
            AccountStatus::Active,
        )
    }

    pub fn deactivate(&mut self) -> DomainResult<()> {
        self.transition(
            &[
                AccountStatus::Pending,
                AccountStatus::Active,
                AccountStatus::Suspended,
            ],
            AccountStatus::Inactive,
        )
    }

    fn transition(&mut self, from: &[AccountStatus], to: AccountStatus) -> DomainResult<()> {
        if !from.contains(&self.status) {
            return Err(DomainError::invariant(format!(
                "cannot move account from {} to {to}",
                self.status
            )));
        }
        self.status = to;
        Ok(())
    }
}

impl Entity for WholesaleAccount {
    type Id = AccountId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Document for WholesaleAccount {
    fn collection() -> &'static str {
        "accounts.wholesale"
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn set_version(&mut self, version: u64) {
        self.version = version;
    }
}
