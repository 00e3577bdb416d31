use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, trace};
use rand::Rng;
use thiserror::Error;

use crate::error::PassError;
use crate::parallel::{ChunkedUpdater, PassReport};
use crate::pool::WorkerPool;

/// Upper bound (exclusive) for a freshly opened account's balance.
pub const MAX_OPENING_BALANCE: i64 = 50_000;

/// Interest is `balance / INTEREST_DIVISOR`, i.e. 5% truncated toward zero.
pub const INTEREST_DIVISOR: i64 = 20;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InterestError {
    #[error("interest on account {id} overflows balance {balance}")]
    Overflow { id: AccountId, balance: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AccountId(pub u64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hands out account IDs starting at 1. Each allocator has its own counter.
#[derive(Debug)]
pub struct IdAllocator {
    next: AtomicU64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn next_id(&self) -> AccountId {
        AccountId(self.next.fetch_add(1, Ordering::Relaxed))
    }

    /// The ID the next call to `next_id` will return.
    pub fn peek(&self) -> AccountId {
        AccountId(self.next.load(Ordering::Relaxed))
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    id: AccountId,
    pub balance: i64,
}

impl Account {
    pub fn new(id: AccountId, balance: i64) -> Self {
        Self { id, balance }
    }

    pub fn id(&self) -> AccountId {
        self.id
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Account {}: {}", self.id, self.balance)
    }
}

/// Balance after one 5% interest payment, truncated toward zero.
///
/// `-30` becomes `-31` and `-10` stays `-10`, mirroring the positive side.
pub fn with_interest(balance: i64) -> Option<i64> {
    balance.checked_add(balance / INTEREST_DIVISOR)
}

/// Credits one interest payment to `account`. On overflow the balance is left untouched.
pub fn apply_interest(account: &mut Account) -> Result<(), InterestError> {
    let old = account.balance;
    account.balance = with_interest(old).ok_or(InterestError::Overflow {
        id: account.id,
        balance: old,
    })?;
    trace!("Old: Account {}: {} New: {}", account.id, old, account);
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct Bank {
    accounts: Vec<Account>,
}

impl Bank {
    /// Opens `count` accounts with random balances in `0..MAX_OPENING_BALANCE`.
    pub fn open<R: Rng + ?Sized>(ids: &IdAllocator, count: usize, rng: &mut R) -> Self {
        let accounts = (0..count)
            .map(|_| Account::new(ids.next_id(), rng.gen_range(0..MAX_OPENING_BALANCE)))
            .collect();
        debug!("opened {} accounts", count);
        Self { accounts }
    }

    pub fn from_balances<I>(ids: &IdAllocator, balances: I) -> Self
    where
        I: IntoIterator<Item = i64>,
    {
        Self {
            accounts: balances
                .into_iter()
                .map(|balance| Account::new(ids.next_id(), balance))
                .collect(),
        }
    }

    pub fn accounts(&self) -> &[Account] {
        &self.accounts
    }

    pub fn accounts_mut(&mut self) -> &mut [Account] {
        &mut self.accounts
    }

    pub fn balances(&self) -> Vec<i64> {
        self.accounts.iter().map(|a| a.balance).collect()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Sum of all balances, widened so a million accounts cannot overflow it.
    pub fn total(&self) -> i128 {
        self.accounts.iter().map(|a| a.balance as i128).sum()
    }

    /// One chunked, parallel interest pass over every account.
    pub fn apply_interest<P: WorkerPool>(
        &mut self,
        updater: &ChunkedUpdater<P>,
    ) -> Result<PassReport, PassError> {
        updater.update(self.accounts.as_mut_slice(), apply_interest)
    }

    /// Single-threaded baseline; stops at the first overflow.
    pub fn apply_interest_serial(&mut self) -> Result<(), InterestError> {
        self.accounts.iter_mut().try_for_each(apply_interest)
    }
}

impl fmt::Display for Bank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Bank Ledger:")?;
        for account in &self.accounts {
            writeln!(f, "\t{}", account)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_ids_are_sequential_from_one() {
        let ids = IdAllocator::new();
        assert_eq!(ids.peek(), AccountId(1));
        assert_eq!(ids.next_id(), AccountId(1));
        assert_eq!(ids.next_id(), AccountId(2));
        assert_eq!(ids.peek(), AccountId(3));
    }

    #[test]
    fn test_allocators_are_independent() {
        let a = IdAllocator::new();
        let b = IdAllocator::new();
        a.next_id();
        a.next_id();
        assert_eq!(b.next_id(), AccountId(1));
    }

    #[test]
    fn test_interest_truncates_toward_zero() {
        let cases = [
            (10, 10),
            (20, 21),
            (30, 31),
            (70, 73),
            (19, 19),
            (0, 0),
            (-10, -10),
            (-30, -31),
            (-70, -73),
        ];
        for (before, after) in cases {
            assert_eq!(with_interest(before), Some(after), "balance {}", before);
        }
    }

    #[test]
    fn test_interest_matches_float_truncation() {
        for balance in -2_000i64..2_000 {
            let expected = (balance as f64 * 1.05).trunc() as i64;
            assert_eq!(with_interest(balance), Some(expected), "balance {}", balance);
        }
    }

    #[test]
    fn test_overflow_leaves_balance() {
        let mut account = Account::new(AccountId(9), i64::MAX);
        let err = apply_interest(&mut account).unwrap_err();
        assert_eq!(
            err,
            InterestError::Overflow {
                id: AccountId(9),
                balance: i64::MAX
            }
        );
        assert_eq!(account.balance, i64::MAX);
    }

    #[test]
    fn test_open_balances_in_range() {
        let ids = IdAllocator::new();
        let mut rng = StdRng::seed_from_u64(7);
        let bank = Bank::open(&ids, 500, &mut rng);

        assert_eq!(bank.len(), 500);
        assert!(bank
            .accounts()
            .iter()
            .all(|a| (0..MAX_OPENING_BALANCE).contains(&a.balance)));
        assert_eq!(bank.accounts()[0].id(), AccountId(1));
        assert_eq!(bank.accounts()[499].id(), AccountId(500));
    }

    #[test]
    fn test_ledger_display() {
        let ids = IdAllocator::new();
        let bank = Bank::from_balances(&ids, [100, 250]);
        assert_eq!(
            bank.to_string(),
            "Bank Ledger:\n\tAccount 1: 100\n\tAccount 2: 250\n"
        );
        assert_eq!(bank.total(), 350);
    }
}
