//! 资源生命周期分析与别名分配
//!
//! 生命周期用执行顺序中的位置表示：`[first_write, last_read]`，两端都包含。
//! 同一 family 的所有版本共享内存，family 的区间是各版本区间的并集。

use std::collections::BTreeMap;

use super::error::RgCompileError;
use super::resource::RgResourceKind;
use super::resource_registry::RgResourceRegistry;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RgLifetime {
    pub first_write: usize,
    pub last_read: usize,
}

impl RgLifetime {
    #[inline]
    pub fn union(self, other: Self) -> Self {
        Self {
            first_write: self.first_write.min(other.first_write),
            last_read: self.last_read.max(other.last_read),
        }
    }

    #[inline]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.first_write <= other.last_read && other.first_write <= self.last_read
    }
}

/// 计算每个资源版本的生命周期
///
/// `positions[pass]` 是 Pass 在执行顺序中的位置。没有 reader 的版本保守地存活到
/// 下一个版本被写入的位置，没有下一个版本时存活到 graph 结尾。
pub fn compute_lifetimes(registry: &RgResourceRegistry, positions: &[usize]) -> Vec<RgLifetime> {
    let end = positions.len().saturating_sub(1);

    registry
        .iter()
        .map(|(_, resource)| {
            let first_write = resource.producer.map_or(0, |pass| positions[pass.index()]);
            let last_read = resource
                .readers
                .iter()
                .map(|reader| positions[reader.index()])
                .max()
                .or_else(|| {
                    let next = resource.superseded_by?;
                    registry.at(next).producer.map(|pass| positions[pass.index()])
                })
                .unwrap_or(end);

            RgLifetime {
                first_write,
                last_read: last_read.max(first_write),
            }
        })
        .collect()
}

/// 按 family 合并生命周期，key 为 family 根下标
pub fn family_lifetimes(registry: &RgResourceRegistry, lifetimes: &[RgLifetime]) -> BTreeMap<usize, RgLifetime> {
    let mut families: BTreeMap<usize, RgLifetime> = BTreeMap::new();
    for (index, resource) in registry.iter() {
        families
            .entry(resource.root)
            .and_modify(|lifetime| *lifetime = lifetime.union(lifetimes[index]))
            .or_insert(lifetimes[index]);
    }
    families
}

/// 一个物理别名槽位
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RgAliasSlot {
    pub kind: RgResourceKind,
    /// 按分配顺序排列的 family 根下标
    pub families: Vec<usize>,
    /// 最后一个 family 的 last_read
    pub end: usize,
    /// 导出资源独占槽位
    pub shareable: bool,
}

/// 别名分配结果
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RgAliasingPlan {
    pub slots: Vec<RgAliasSlot>,
    /// family 根下标 -> 槽位；导入资源没有槽位
    pub slot_of_family: BTreeMap<usize, usize>,
}

impl RgAliasingPlan {
    #[inline]
    pub fn slot_of(&self, root: usize) -> Option<usize> {
        self.slot_of_family.get(&root).copied()
    }
}

/// 两个 family 的描述是否允许共享内存
fn families_can_alias(registry: &RgResourceRegistry, a: usize, b: usize) -> bool {
    let (ra, rb) = (registry.at(a), registry.at(b));
    if ra.kind != rb.kind {
        return false;
    }
    match ra.kind {
        RgResourceKind::Image => match (registry.image_desc(ra.desc_index), registry.image_desc(rb.desc_index)) {
            (Some(da), Some(db)) => da.can_alias(db),
            _ => false,
        },
        RgResourceKind::Buffer => match (registry.buffer_desc(ra.desc_index), registry.buffer_desc(rb.desc_index)) {
            (Some(da), Some(db)) => da.can_alias(db),
            _ => false,
        },
    }
}

fn family_is_exported(registry: &RgResourceRegistry, root: usize) -> bool {
    registry.family(root).any(|index| registry.at(index).export.is_some())
}

/// first-fit 别名分配
///
/// family 按 `(first_write, root)` 排序，依次放入第一个描述兼容、且上一个占用者
/// 在本 family 开始之前已经结束的槽位；找不到时新开一个槽位。
/// 导入的 family 不分配槽位，导出的 family 独占槽位。
pub fn assign_aliases(
    registry: &RgResourceRegistry,
    families: &BTreeMap<usize, RgLifetime>,
    enable_aliasing: bool,
) -> RgAliasingPlan {
    let mut plan = RgAliasingPlan::default();

    let mut sorted: Vec<(usize, RgLifetime)> = families
        .iter()
        .filter(|(root, _)| !registry.at(**root).is_imported())
        .map(|(root, lifetime)| (*root, *lifetime))
        .collect();
    sorted.sort_by_key(|(root, lifetime)| (lifetime.first_write, *root));

    for (root, lifetime) in sorted {
        let shareable = enable_aliasing && !family_is_exported(registry, root);

        let found = if shareable {
            plan.slots.iter().position(|slot| {
                slot.shareable
                    && slot.end < lifetime.first_write
                    && families_can_alias(registry, slot.families[0], root)
            })
        } else {
            None
        };

        let slot_index = match found {
            Some(slot_index) => {
                let slot = &mut plan.slots[slot_index];
                log::debug!(
                    "RenderGraph: '{}' aliases slot #{} after '{}' (starts at {}, slot ends at {})",
                    registry.at(root).name,
                    slot_index,
                    slot.families.last().map(|&r| registry.at(r).name.as_str()).unwrap_or_default(),
                    lifetime.first_write,
                    slot.end
                );
                slot.families.push(root);
                slot.end = lifetime.last_read;
                slot_index
            }
            None => {
                plan.slots.push(RgAliasSlot {
                    kind: registry.at(root).kind,
                    families: vec![root],
                    end: lifetime.last_read,
                    shareable,
                });
                plan.slots.len() - 1
            }
        };
        plan.slot_of_family.insert(root, slot_index);
    }

    plan
}

/// 校验别名分配：同槽位的 family 描述必须兼容，生命周期必须不相交
pub fn verify_aliases(
    registry: &RgResourceRegistry,
    families: &BTreeMap<usize, RgLifetime>,
    plan: &RgAliasingPlan,
) -> Result<(), RgCompileError> {
    for slot in &plan.slots {
        for (i, &a) in slot.families.iter().enumerate() {
            for &b in &slot.families[i + 1..] {
                if !families_can_alias(registry, a, b) {
                    return Err(RgCompileError::InconsistentAlias {
                        first: registry.at(a).name.clone(),
                        second: registry.at(b).name.clone(),
                    });
                }
                if families[&a].overlaps(&families[&b]) {
                    return Err(RgCompileError::AliasOverlap {
                        first: registry.at(a).name.clone(),
                        second: registry.at(b).name.clone(),
                    });
                }
            }
        }
    }
    Ok(())
}
