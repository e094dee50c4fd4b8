use rand::Rng;

use super::{GachaItem, GachaPool, Rarity, TEN_PULL};

/// Weighted pick: roll in `0..Σweight` and take the first item whose
/// cumulative weight exceeds the roll. `None` for an empty or weightless
/// candidate list.
pub fn pick<'a, R: Rng + ?Sized>(items: &[&'a GachaItem], rng: &mut R) -> Option<&'a GachaItem> {
    let total: u64 = items.iter().map(|i| u64::from(i.weight)).sum();
    if total == 0 {
        return None;
    }

    let roll = rng.gen_range(0..total);
    let mut cumulative = 0u64;
    for item in items {
        cumulative += u64::from(item.weight);
        if roll < cumulative {
            return Some(*item);
        }
    }
    None
}

/// Draw `count` items. A ten-pull without any item at or above `guaranteed`
/// has its last slot re-drawn from those items.
pub fn draw_items<R: Rng + ?Sized>(
    pool: &GachaPool,
    count: u32,
    guaranteed: Rarity,
    rng: &mut R,
) -> Vec<GachaItem> {
    let all: Vec<&GachaItem> = pool.items.iter().collect();
    let mut drawn: Vec<GachaItem> = (0..count)
        .filter_map(|_| pick(&all, rng).cloned())
        .collect();

    if count == TEN_PULL && !drawn.iter().any(|i| i.rarity >= guaranteed) {
        let eligible = pool.at_least(guaranteed);
        if let Some(item) = pick(&eligible, rng) {
            if let Some(last) = drawn.last_mut() {
                *last = item.clone();
            }
        }
    }

    drawn
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashMap;

    fn item(id: &str, rarity: Rarity, weight: u32) -> GachaItem {
        GachaItem {
            id: id.into(),
            name: id.into(),
            rarity,
            weight,
        }
    }

    #[test]
    fn test_pick_respects_weights() {
        let heavy = item("heavy", Rarity::N, 90);
        let light = item("light", Rarity::SSR, 10);
        let items = vec![&heavy, &light];
        let mut rng = StdRng::seed_from_u64(7);

        let mut counts: HashMap<&str, u32> = HashMap::new();
        for _ in 0..10_000 {
            let picked = pick(&items, &mut rng).unwrap();
            *counts.entry(picked.id.as_str()).or_default() += 1;
        }
        let light_share = f64::from(counts["light"]) / 10_000.0;
        assert!((0.08..0.12).contains(&light_share), "share was {}", light_share);
    }

    #[test]
    fn test_pick_empty() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(pick(&[], &mut rng).is_none());
    }

    #[test]
    fn test_same_seed_same_draw() {
        let pool = GachaPool::default();
        let a = draw_items(&pool, 10, Rarity::SR, &mut StdRng::seed_from_u64(42));
        let b = draw_items(&pool, 10, Rarity::SR, &mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
        assert_eq!(a.len(), 10);
    }

    #[test]
    fn test_ten_pull_guarantee() {
        // the common item is practically certain, so the guarantee must kick in
        let pool = GachaPool {
            items: vec![
                item("common", Rarity::N, 1_000_000),
                item("rare", Rarity::SR, 1),
            ],
        };
        for seed in 0..20 {
            let drawn = draw_items(&pool, 10, Rarity::SR, &mut StdRng::seed_from_u64(seed));
            assert_eq!(drawn.len(), 10);
            assert!(drawn.iter().any(|i| i.rarity >= Rarity::SR));
            assert_eq!(drawn[9].id, "rare");
        }
    }

    #[test]
    fn test_single_has_no_guarantee() {
        let pool = GachaPool {
            items: vec![item("common", Rarity::N, 1)],
        };
        let drawn = draw_items(&pool, 1, Rarity::SR, &mut StdRng::seed_from_u64(3));
        assert_eq!(drawn, vec![item("common", Rarity::N, 1)]);
    }
}
