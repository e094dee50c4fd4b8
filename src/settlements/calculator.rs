//! Split, balance and repayment arithmetic. Pure functions over integer yen.

use std::collections::{BTreeMap, HashSet};

use super::{Balance, Settlement, Share, Suggestion, Transfer};
use crate::error::{OsikatuError, Result};

/// Split `total` evenly. The remainder goes one yen at a time to
/// participants in ascending user id order.
///
/// ```
/// use osikatu::settlements::split_equal;
///
/// let shares = split_equal(1000, &["c".into(), "a".into(), "b".into()]).unwrap();
/// let amounts: Vec<_> = shares.iter().map(|s| (s.user_id.as_str(), s.amount)).collect();
/// assert_eq!(amounts, vec![("a", 334), ("b", 333), ("c", 333)]);
/// ```
pub fn split_equal(total: i64, participants: &[String]) -> Result<Vec<Share>> {
    if participants.is_empty() {
        return Err(OsikatuError::validation(
            "participants",
            "at least one participant is required",
        ));
    }
    ensure_unique(participants.iter(), "participants")?;
    if total < 0 {
        return Err(OsikatuError::validation("total_amount", "must not be negative"));
    }

    let mut sorted: Vec<&String> = participants.iter().collect();
    sorted.sort();

    let n = sorted.len() as i64;
    let base = total / n;
    let remainder = total % n;
    Ok(sorted
        .into_iter()
        .enumerate()
        .map(|(i, user_id)| Share {
            user_id: user_id.clone(),
            amount: base + i64::from((i as i64) < remainder),
        })
        .collect())
}

/// Custom shares must be non-negative, name each user once and add up to `total`.
pub fn validate_custom_shares(total: i64, shares: &[Share]) -> Result<Vec<Share>> {
    if shares.is_empty() {
        return Err(OsikatuError::validation("shares", "at least one share is required"));
    }
    ensure_unique(shares.iter().map(|s| &s.user_id), "shares")?;
    if shares.iter().any(|s| s.amount < 0) {
        return Err(OsikatuError::validation("shares", "amounts must not be negative"));
    }

    let sum = shares
        .iter()
        .try_fold(0i64, |acc, s| acc.checked_add(s.amount))
        .ok_or_else(|| OsikatuError::validation("shares", "amounts are too large"))?;
    if sum != total {
        return Err(OsikatuError::validation(
            "shares",
            format!("shares add up to {} but the total is {}", sum, total),
        ));
    }
    Ok(shares.to_vec())
}

fn ensure_unique<'a>(ids: impl Iterator<Item = &'a String>, field: &str) -> Result<()> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id.as_str()) {
            return Err(OsikatuError::validation(field, format!("{} appears more than once", id)));
        }
    }
    Ok(())
}

/// Per-user totals, sorted by user id.
///
/// Current `members` always appear; anyone else only while their net is
/// non-zero. The nets always sum to zero.
pub fn balances(members: &[String], settlements: &[Settlement], transfers: &[Transfer]) -> Vec<Balance> {
    let mut totals: BTreeMap<&str, (i64, i64)> = BTreeMap::new();
    for member in members {
        totals.entry(member.as_str()).or_default();
    }

    for settlement in settlements {
        totals.entry(settlement.payer_id.as_str()).or_default().0 += settlement.total_amount;
        for share in &settlement.shares {
            totals.entry(share.user_id.as_str()).or_default().1 += share.amount;
        }
    }
    for transfer in transfers {
        totals.entry(transfer.from_user_id.as_str()).or_default().0 += transfer.amount;
        totals.entry(transfer.to_user_id.as_str()).or_default().1 += transfer.amount;
    }

    totals
        .into_iter()
        .map(|(user_id, (paid, owed))| Balance {
            user_id: user_id.to_string(),
            paid,
            owed,
            net: paid - owed,
        })
        .filter(|b| b.net != 0 || members.iter().any(|m| *m == b.user_id))
        .collect()
}

/// Greedy repayment plan.
///
/// Debtors and creditors are each sorted by amount (largest first, ties by
/// user id). The largest remaining debtor pays the largest remaining
/// creditor `min(debt, credit)`; whoever reaches zero is done. The result
/// has at most `creditors + debtors - 1` entries and zeroes every balance
/// when applied.
pub fn suggestions(balances: &[Balance]) -> Vec<Suggestion> {
    let by_amount = |a: &(&str, i64), b: &(&str, i64)| b.1.cmp(&a.1).then(a.0.cmp(b.0));

    let mut creditors: Vec<(&str, i64)> = balances
        .iter()
        .filter(|b| b.net > 0)
        .map(|b| (b.user_id.as_str(), b.net))
        .collect();
    let mut debtors: Vec<(&str, i64)> = balances
        .iter()
        .filter(|b| b.net < 0)
        .map(|b| (b.user_id.as_str(), -b.net))
        .collect();
    creditors.sort_by(by_amount);
    debtors.sort_by(by_amount);

    let mut result = Vec::new();
    let (mut d, mut c) = (0, 0);
    while d < debtors.len() && c < creditors.len() {
        let amount = debtors[d].1.min(creditors[c].1);
        result.push(Suggestion {
            from_user_id: debtors[d].0.to_string(),
            to_user_id: creditors[c].0.to_string(),
            amount,
        });
        debtors[d].1 -= amount;
        creditors[c].1 -= amount;
        if debtors[d].1 == 0 {
            d += 1;
        }
        if creditors[c].1 == 0 {
            c += 1;
        }
    }
    result
}
