//! Cash ledger aggregation.
//!
//! Pure functions over a slice of stored movements. Nothing here fails: a
//! movement with an unknown type or payment method contributes nothing to
//! the balances, missing amounts count as zero, and a movement without a
//! readable timestamp is left out of the calendar windows while still
//! counting towards the running balance.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    Money, MovementDoc, MovementKind, PaymentMethod,
    clock::{same_civil_day, same_civil_month},
};

/// Calendar window, evaluated in the civil timezone.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Period {
    Today,
    ThisMonth,
}

pub fn in_period(movement: &MovementDoc, period: Period, now: DateTime<Utc>) -> bool {
    let Some(at) = movement.occurred_at() else {
        return false;
    };
    match period {
        Period::Today => same_civil_day(at, now),
        Period::ThisMonth => same_civil_month(at, now),
    }
}

/// Movements falling in `period`, in input order.
pub fn filter_period(movements: &[MovementDoc], period: Period, now: DateTime<Utc>) -> Vec<MovementDoc> {
    movements
        .iter()
        .filter(|movement| in_period(movement, period, now))
        .cloned()
        .collect()
}

/// An amount per payment method.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MethodTotals {
    pub cash: Money,
    pub mobile_wallet: Money,
}

impl MethodTotals {
    pub fn of(&self, method: PaymentMethod) -> Money {
        match method {
            PaymentMethod::Cash => self.cash,
            PaymentMethod::MobileWallet => self.mobile_wallet,
        }
    }

    fn slot(&mut self, method: PaymentMethod) -> &mut Money {
        match method {
            PaymentMethod::Cash => &mut self.cash,
            PaymentMethod::MobileWallet => &mut self.mobile_wallet,
        }
    }

    /// Sum over every payment method.
    pub fn total(&self) -> Money {
        PaymentMethod::ALL.iter().map(|method| self.of(*method)).sum()
    }
}

/// Available money per payment method: inflows (sales, cash-ins) minus
/// outflows (purchases, cash-outs).
pub type Balances = MethodTotals;

/// Cash balance over `movements`, per payment method.
pub fn balances(movements: &[MovementDoc]) -> Balances {
    let mut balances = Balances::default();
    for movement in movements {
        let (Some(kind), Some(method)) = (movement.kind(), movement.payment_method()) else {
            continue;
        };
        let slot = balances.slot(method);
        if kind.is_inflow() {
            *slot += movement.total();
        } else {
            *slot -= movement.total();
        }
    }
    balances
}

/// Per-type, per-method subtotals shown on the daily totals block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DayTotals {
    pub sales: MethodTotals,
    pub purchases: MethodTotals,
    pub cash_in: MethodTotals,
    pub cash_out: MethodTotals,
    /// Units sold across every sale.
    pub units_sold: u64,
}

impl DayTotals {
    pub fn by_kind(&self, kind: MovementKind) -> &MethodTotals {
        match kind {
            MovementKind::Sale => &self.sales,
            MovementKind::Purchase => &self.purchases,
            MovementKind::CashIn => &self.cash_in,
            MovementKind::CashOut => &self.cash_out,
        }
    }

    fn by_kind_mut(&mut self, kind: MovementKind) -> &mut MethodTotals {
        match kind {
            MovementKind::Sale => &mut self.sales,
            MovementKind::Purchase => &mut self.purchases,
            MovementKind::CashIn => &mut self.cash_in,
            MovementKind::CashOut => &mut self.cash_out,
        }
    }

    /// Balances derived from the subtotals; equal to [`balances`] over the
    /// same movements.
    pub fn balances(&self) -> Balances {
        let mut balances = Balances::default();
        for method in PaymentMethod::ALL {
            *balances.slot(method) = self.sales.of(method) + self.cash_in.of(method)
                - self.purchases.of(method)
                - self.cash_out.of(method);
        }
        balances
    }
}

pub fn day_totals(movements: &[MovementDoc]) -> DayTotals {
    let mut totals = DayTotals::default();
    for movement in movements {
        let Some(kind) = movement.kind() else {
            continue;
        };
        if kind == MovementKind::Sale {
            totals.units_sold = totals.units_sold.saturating_add(movement.quantity());
        }
        if let Some(method) = movement.payment_method() {
            *totals.by_kind_mut(kind).slot(method) += movement.total();
        }
    }
    totals
}

/// Everything the till screen derives from the movement list.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LedgerSummary {
    pub this_month: Vec<MovementDoc>,
    pub today: Vec<MovementDoc>,
    /// Balances over the entire history; purchases and cash-outs are checked
    /// against these.
    pub running: Balances,
    pub today_totals: DayTotals,
}

impl LedgerSummary {
    pub fn compute(movements: &[MovementDoc], now: DateTime<Utc>) -> Self {
        let today = filter_period(movements, Period::Today, now);
        let today_totals = day_totals(&today);
        Self {
            this_month: filter_period(movements, Period::ThisMonth, now),
            today,
            running: balances(movements),
            today_totals,
        }
    }

    pub fn today_balances(&self) -> Balances {
        self.today_totals.balances()
    }
}
