//! Block partitioning strategies: group jobs into batches either by a
//! target batch count or by tiling them into a fixed-height 2D bin.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::batching::block::{perimeter, Block, Bucket, Packer};

/// Automatically choose the batch count (or, for [`pack_to_height`],
/// automatically choose how many batches a tiling needs).
pub const AUTO: i64 = 1_000_001;
/// Put every block into its own batch.
pub const ONE_PER_BUCKET: i64 = 1_000_002;

/// Group blocks transitively by dependency: a block and every block in its
/// dependency closure end up in the same group. Disjoint groups have no
/// edges between them at all.
pub fn groupby_dep(blocks: &[Block]) -> Vec<HashSet<usize>> {
    let mut sets: Vec<HashSet<usize>> =
        (0..blocks.len()).map(|i| {
            let mut s = HashSet::from([i]);
            s.extend(blocks[i].dependencies.iter().copied());
            s
        }).collect();

    let mut groups: Vec<HashSet<usize>> = Vec::new();
    while let Some(mut first) = sets.pop() {
        let mut combined = true;
        while combined {
            combined = false;
            for other in &mut sets {
                if !other.is_empty() && !first.is_disjoint(other) {
                    first.extend(other.iter().copied());
                    other.clear();
                    combined = true;
                }
            }
        }
        groups.push(first);
        sets.retain(|s| !s.is_empty());
    }
    groups.reverse();
    groups
}

/// Balance blocks across at most `count` buckets by total group size,
/// without regard to inter-group submission ordering (deps may span
/// buckets; only intra-bucket edges are avoided, via [`groupby_dep`]).
pub fn pack_by_count_atomic(blocks: &[Block], count: i64) -> Result<Vec<Bucket>, String> {
    if count <= 0 {
        return Err(format!("count={count} must be > 0"));
    }
    if count == 1 {
        return Ok(vec![Bucket::from_members((0..blocks.len()).collect())]);
    }
    let groups = groupby_dep(blocks);

    if count == AUTO {
        let mut buckets: Vec<Bucket> = groups
            .iter()
            .filter(|g| g.len() > 1)
            .map(|g| Bucket::from_members(g.iter().copied().collect()))
            .collect();
        let mean_size = if buckets.is_empty() {
            0.0
        } else {
            buckets.iter().map(|b| b.size(blocks)).sum::<f64>() / buckets.len() as f64
        };
        let mut singleton = Bucket::new();
        for group in &groups {
            if group.len() == 1 {
                singleton.extend(group.iter().copied());
                if singleton.size(blocks) >= mean_size {
                    buckets.push(std::mem::take(&mut singleton));
                }
            }
        }
        if !singleton.is_empty() {
            buckets.push(singleton);
        }
        return Ok(buckets);
    }

    let mut buckets: Vec<Bucket> = (0..count).map(|_| Bucket::new()).collect();
    for group in &groups {
        let target = buckets
            .iter_mut()
            .min_by(|a, b| a.size(blocks).total_cmp(&b.size(blocks)))
            .expect("count > 0 guarantees at least one bucket");
        target.extend(group.iter().copied());
    }
    Ok(buckets)
}

/// Kahn's-algorithm topological leveling: each level is every
/// not-yet-emitted block whose dependencies have already been emitted.
fn topological_levels(blocks: &[Block]) -> Vec<Vec<usize>> {
    let n = blocks.len();
    let valid: HashSet<usize> = (0..n).collect();
    let mut remaining_deps: Vec<HashSet<usize>> =
        blocks.iter().map(|b| b.dependencies.iter().copied().filter(|d| valid.contains(d)).collect()).collect();
    let mut done = vec![false; n];
    let mut levels = Vec::new();

    loop {
        let ready: Vec<usize> =
            (0..n).filter(|&i| !done[i] && remaining_deps[i].is_empty()).collect();
        if ready.is_empty() {
            break;
        }
        for &i in &ready {
            done[i] = true;
        }
        for deps in &mut remaining_deps {
            for &r in &ready {
                deps.remove(&r);
            }
        }
        levels.push(ready);
    }
    levels
}

/// Pack blocks into buckets so that no bucket has an intra-bucket
/// dependency edge, following topological levels of the dependency graph.
pub fn pack_by_count(blocks: &[Block], count: i64, groupby_extent: bool) -> Result<Vec<Bucket>, String> {
    if count == ONE_PER_BUCKET {
        return Ok((0..blocks.len()).map(|i| Bucket::from_members(vec![i])).collect());
    }
    if count == 1 {
        return Ok(vec![Bucket::from_members((0..blocks.len()).collect())]);
    }

    let levels = topological_levels(blocks);
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for level in levels {
        if groupby_extent {
            let mut by_extent: HashMap<u32, Vec<usize>> = HashMap::new();
            for &i in &level {
                by_extent.entry(blocks[i].extent).or_default().push(i);
            }
            groups.extend(by_extent.into_values());
        } else {
            groups.push(level);
        }
    }

    if count == AUTO {
        return Ok(groups.into_iter().map(Bucket::from_members).collect());
    }
    if groups.len() as i64 > count {
        return Err(format!("count={count} insufficient to partition blocks"));
    }

    let sizes: Vec<f64> = groups.iter().map(|g| g.iter().map(|&i| blocks[i].norm()).sum()).collect();
    let total_size: f64 = sizes.iter().sum();
    let mut order: Vec<usize> = (0..groups.len()).collect();
    order.sort_by(|&a, &b| sizes[a].total_cmp(&sizes[b]));

    let mut nbuckets_each = Vec::with_capacity(order.len());
    let mut allocated = 0i64;
    for (rank, &g) in order.iter().enumerate() {
        if rank + 1 == order.len() {
            nbuckets_each.push(count - allocated);
        } else {
            let share = (count as f64 * sizes[g] / total_size).floor() as i64;
            let share = share.max(1);
            nbuckets_each.push(share);
            allocated += share;
        }
    }

    let mut buckets = Vec::new();
    for (slot, &g) in order.iter().enumerate() {
        let n = nbuckets_each[slot].max(1) as usize;
        let mut tmp: Vec<Bucket> = (0..n).map(|_| Bucket::new()).collect();
        for &block in &groups[g] {
            let target = tmp
                .iter_mut()
                .min_by(|a, b| a.size(blocks).total_cmp(&b.size(blocks)))
                .expect("n > 0");
            target.add(block);
        }
        buckets.extend(tmp.into_iter().filter(|b| !b.is_empty()));
    }
    Ok(buckets)
}

/// Tile blocks into a fixed-height 2D bin, emitting one bucket per packing
/// pass; unfit blocks from a pass are re-packed in a subsequent pass so no
/// block is ever dropped.
pub fn pack_to_height(blocks: &[Block], height: u32, groupby_extent: bool) -> Result<Vec<Bucket>, String> {
    let levels = topological_levels(blocks);
    let mut packer = Packer::new();
    let mut buckets = Vec::new();

    let pack_ready = |packer: &mut Packer, ready: &[usize], buckets: &mut Vec<Bucket>| -> Result<(), String> {
        let mut remaining: Vec<usize> = ready.to_vec();
        loop {
            if remaining.is_empty() {
                break;
            }
            let width = remaining.iter().map(|&i| blocks[i].extent).max().unwrap_or(1);
            let target_height = height.max(remaining.iter().map(|&i| blocks[i].height).max().unwrap_or(1));
            let refs: Vec<&Block> = remaining.iter().map(|&i| &blocks[i]).collect();
            let fits = packer.pack(&refs, Some(width), Some(target_height));
            let _ = perimeter(&fits);

            let mut fit_members = Vec::new();
            let mut unfit = Vec::new();
            for (idx, fit) in remaining.iter().zip(fits.iter()) {
                if fit.is_some() {
                    fit_members.push(*idx);
                } else {
                    unfit.push(*idx);
                }
            }
            buckets.push(Bucket::from_members(fit_members));
            if unfit.len() == remaining.len() {
                return Err("unable to partition blocks".to_string());
            }
            remaining = unfit;
        }
        Ok(())
    };

    for level in levels {
        if groupby_extent {
            let mut by_extent: HashMap<u32, Vec<usize>> = HashMap::new();
            for &i in &level {
                by_extent.entry(blocks[i].extent).or_default().push(i);
            }
            for (_, group) in by_extent {
                let mut sorted = group;
                sorted.sort_by(|&a, &b| blocks[b].norm().total_cmp(&blocks[a].norm()));
                pack_ready(&mut packer, &sorted, &mut buckets)?;
            }
        } else {
            let mut sorted = level;
            sorted.sort_by(|&a, &b| blocks[b].norm().total_cmp(&blocks[a].norm()));
            pack_ready(&mut packer, &sorted, &mut buckets)?;
        }
    }

    let total: usize = buckets.iter().map(Bucket::len).sum();
    if total != blocks.len() {
        return Err("incorrect partition lengths".to_string());
    }
    Ok(buckets.into_iter().filter(|b| !b.is_empty()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blocks(n: usize) -> Vec<Block> {
        (0..n).map(|i| Block::new(i.to_string(), 4, 100, vec![])).collect()
    }

    #[test]
    fn groupby_dep_separates_unrelated_blocks() {
        let b = blocks(3);
        let groups = groupby_dep(&b);
        assert_eq!(groups.len(), 3);
    }

    #[test]
    fn groupby_dep_merges_dependency_chain() {
        let mut b = blocks(3);
        b[1].dependencies.push(0);
        b[2].dependencies.push(1);
        let groups = groupby_dep(&b);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 3);
    }

    #[test]
    fn pack_by_count_atomic_respects_count() {
        let b = blocks(9);
        let buckets = pack_by_count_atomic(&b, 3).unwrap();
        assert!(buckets.len() <= 3);
        let total: usize = buckets.iter().map(Bucket::len).sum();
        assert_eq!(total, 9);
    }

    #[test]
    fn pack_by_count_atomic_one_bucket() {
        let b = blocks(5);
        let buckets = pack_by_count_atomic(&b, 1).unwrap();
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].len(), 5);
    }

    #[test]
    fn pack_by_count_one_per_bucket() {
        let b = blocks(4);
        let buckets = pack_by_count(&b, ONE_PER_BUCKET, false).unwrap();
        assert_eq!(buckets.len(), 4);
    }

    #[test]
    fn pack_by_count_respects_dependency_levels() {
        let mut b = blocks(3);
        b[1].dependencies.push(0);
        b[2].dependencies.push(1);
        let buckets = pack_by_count(&b, AUTO, false).unwrap();
        assert_eq!(buckets.len(), 3);
    }

    #[test]
    fn pack_to_height_covers_every_block() {
        let b = blocks(20);
        let buckets = pack_to_height(&b, 200, false).unwrap();
        let total: usize = buckets.iter().map(Bucket::len).sum();
        assert_eq!(total, 20);
    }
}
