//! Barrier 自动计算
//!
//! 按执行顺序模拟每个 family 的状态变化：Pass 声明的状态与 family 当前状态不同，
//! 或者任一方是写入时，就在 Pass 之前插入一个转换。
//!
//! 物理资源跨帧复用，帧内第一次访问要等待上一帧对同一块内存的最后一次访问，
//! 因此先模拟一遍得到帧末状态，再以它为起点计算真正的 barrier。

use std::collections::HashMap;

use ash::vk;

use super::image_resource::RgImageDesc;
use super::lifetime::RgAliasingPlan;
use super::pass::RgResourceAccess;
use super::resource::RgResourceKind;
use super::resource_registry::RgResourceRegistry;
use super::resource_state::{RgAccessState, RgBufferState, RgImageState};

/// 图像 Barrier 描述
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RgImageBarrierDesc {
    /// family 根下标
    pub resource: usize,
    pub src_state: RgImageState,
    pub dst_state: RgImageState,
    pub aspect: vk::ImageAspectFlags,
    pub mip_levels: u32,
    pub array_layers: u32,
}

impl RgImageBarrierDesc {
    #[inline]
    pub fn has_layout_transition(&self) -> bool {
        self.src_state.layout != self.dst_state.layout
    }
}

/// 缓冲区 Barrier 描述
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RgBufferBarrierDesc {
    /// family 根下标
    pub resource: usize,
    pub src_state: RgBufferState,
    pub dst_state: RgBufferState,
}

/// Pass 执行前需要的 Barrier 集合
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RgPassBarriers {
    pub image_barriers: Vec<RgImageBarrierDesc>,
    pub buffer_barriers: Vec<RgBufferBarrierDesc>,
}

impl RgPassBarriers {
    #[inline]
    pub fn has_barriers(&self) -> bool {
        !self.image_barriers.is_empty() || !self.buffer_barriers.is_empty()
    }

    #[inline]
    pub fn image_barrier_count(&self) -> usize {
        self.image_barriers.len()
    }

    #[inline]
    pub fn buffer_barrier_count(&self) -> usize {
        self.buffer_barriers.len()
    }
}

/// 一个 Pass 对各 family 的访问，同一 family 的多次声明已合并
pub struct RgPassAccessSummary {
    pub pass: usize,
    pub accesses: Vec<(usize, RgAccessState)>,
}

impl RgPassAccessSummary {
    /// 按首次出现的顺序合并同一 family 的访问
    pub fn fold<'a>(
        pass: usize,
        registry: &RgResourceRegistry,
        accesses: impl Iterator<Item = &'a RgResourceAccess>,
    ) -> Self {
        let mut folded: Vec<(usize, RgAccessState)> = Vec::new();
        for access in accesses {
            let root = registry.get(access.handle).root;
            match folded.iter_mut().find(|(r, _)| *r == root) {
                Some((_, state)) => *state = merge_states(*state, access.state),
                None => folded.push((root, access.state)),
            }
        }
        Self { pass, accesses: folded }
    }
}

fn merge_states(a: RgAccessState, b: RgAccessState) -> RgAccessState {
    match (a, b) {
        (RgAccessState::Image(a), RgAccessState::Image(b)) => RgAccessState::Image(a.merge(b)),
        (RgAccessState::Buffer(a), RgAccessState::Buffer(b)) => RgAccessState::Buffer(a.merge(b)),
        // 同一 family 的种类不会变化
        (_, b) => b,
    }
}

/// Barrier 计算结果
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RgBarrierPlan {
    /// 按 Pass 声明序号索引
    pub passes: Vec<RgPassBarriers>,
    /// 最后一个 Pass 之后，导出图像转换到最终状态
    pub trailing: RgPassBarriers,
}

/// Barrier 计算器
pub struct BarrierCalculator<'a> {
    registry: &'a RgResourceRegistry,
    aliasing: &'a RgAliasingPlan,

    /// family 当前状态
    states: HashMap<usize, RgAccessState>,
    /// 槽位中最近一次访问的状态，交接给下一个占用者
    slot_states: HashMap<usize, RgAccessState>,

    /// 上一帧结束时各槽位的状态
    carried_slots: HashMap<usize, RgAccessState>,
    /// 上一帧结束时没有槽位的 family 的状态
    carried_families: HashMap<usize, RgAccessState>,
}

/// 是否需要在两次访问之间插入 barrier
///
/// 只有状态相同的两次读取可以省略。
#[inline]
pub fn needs_barrier(current: RgAccessState, required: RgAccessState) -> bool {
    current != required || current.is_write() || required.is_write()
}

impl<'a> BarrierCalculator<'a> {
    pub fn new(registry: &'a RgResourceRegistry, aliasing: &'a RgAliasingPlan) -> Self {
        Self {
            registry,
            aliasing,
            states: HashMap::new(),
            slot_states: HashMap::new(),
            carried_slots: HashMap::new(),
            carried_families: HashMap::new(),
        }
    }

    /// 依次处理按执行顺序排列的 Pass
    ///
    /// 编译结果每帧重复执行，第一遍的帧末状态就是第二遍的帧初状态。
    pub fn compute(mut self, pass_count: usize, ordered: &[RgPassAccessSummary]) -> RgBarrierPlan {
        self.simulate(pass_count, ordered);

        self.carried_slots = std::mem::take(&mut self.slot_states);
        let (registry, aliasing) = (self.registry, self.aliasing);
        self.carried_families = std::mem::take(&mut self.states)
            .into_iter()
            .filter(|(root, _)| aliasing.slot_of(*root).is_none() && !registry.at(*root).is_imported())
            .collect();

        self.simulate(pass_count, ordered)
    }

    fn simulate(&mut self, pass_count: usize, ordered: &[RgPassAccessSummary]) -> RgBarrierPlan {
        let mut plan = RgBarrierPlan {
            passes: vec![RgPassBarriers::default(); pass_count],
            trailing: RgPassBarriers::default(),
        };

        for summary in ordered {
            let barriers = &mut plan.passes[summary.pass];
            for &(root, required) in &summary.accesses {
                let current = self.current_state(root);
                if needs_barrier(current, required) {
                    self.push_barrier(barriers, root, current, required);
                }
                self.record_state(root, required);
            }
        }

        let registry = self.registry;
        for root in registry.roots() {
            let final_state = registry
                .family(root)
                .filter_map(|index| registry.at(index).export.and_then(|export| export.final_state))
                .last();
            let Some(final_state) = final_state else {
                continue;
            };
            let current = self.current_state(root);
            let required = RgAccessState::Image(final_state);
            if needs_barrier(current, required) {
                self.push_barrier(&mut plan.trailing, root, current, required);
            }
            self.record_state(root, required);
        }

        plan
    }

    fn record_state(&mut self, root: usize, state: RgAccessState) {
        self.states.insert(root, state);
        if let Some(slot) = self.aliasing.slot_of(root) {
            self.slot_states.insert(slot, state);
        }
    }

    /// family 在本帧中的当前状态
    ///
    /// 首次访问时：导入资源使用导入状态；否则从同一块内存上一次访问的 stage/access 开始
    /// （本帧槽位中的上一个占用者，或者上一帧结束时的状态），内容丢弃，layout 为 UNDEFINED。
    /// 都没有时为 UNDEFINED。
    fn current_state(&self, root: usize) -> RgAccessState {
        if let Some(state) = self.states.get(&root) {
            return *state;
        }

        let resource = self.registry.at(root);
        if let Some(import) = resource.import {
            return import.initial_state;
        }

        let previous = match self.aliasing.slot_of(root) {
            Some(slot) => self.slot_states.get(&slot).or_else(|| self.carried_slots.get(&slot)),
            None => self.carried_families.get(&root),
        };
        match (resource.kind, previous) {
            (RgResourceKind::Image, Some(prev)) => RgAccessState::Image(RgImageState::new(
                prev.stage(),
                prev.access(),
                vk::ImageLayout::UNDEFINED,
            )),
            (RgResourceKind::Buffer, Some(prev)) => RgAccessState::Buffer(RgBufferState::new(prev.stage(), prev.access())),
            (RgResourceKind::Image, None) => RgAccessState::Image(RgImageState::UNDEFINED),
            (RgResourceKind::Buffer, None) => RgAccessState::Buffer(RgBufferState::UNDEFINED),
        }
    }

    fn push_barrier(&self, barriers: &mut RgPassBarriers, root: usize, current: RgAccessState, required: RgAccessState) {
        match (current, required) {
            (RgAccessState::Image(src_state), RgAccessState::Image(dst_state)) => {
                let resource = self.registry.at(root);
                let (aspect, mip_levels, array_layers) = self
                    .registry
                    .image_desc(resource.desc_index)
                    .map(|desc| (RgImageDesc::infer_aspect(desc.format), desc.mip_levels, desc.array_layers))
                    .unwrap_or((vk::ImageAspectFlags::COLOR, 1, 1));
                barriers.image_barriers.push(RgImageBarrierDesc {
                    resource: root,
                    src_state,
                    dst_state,
                    aspect,
                    mip_levels,
                    array_layers,
                });
            }
            (RgAccessState::Buffer(src_state), RgAccessState::Buffer(dst_state)) => {
                barriers.buffer_barriers.push(RgBufferBarrierDesc {
                    resource: root,
                    src_state,
                    dst_state,
                });
            }
            _ => {
                log::warn!(
                    "RenderGraph: '{}' declared with mismatched image/buffer states, barrier skipped",
                    self.registry.at(root).name
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render_graph::buffer_resource::RgBufferDesc;
    use crate::render_graph::lifetime::RgAliasSlot;
    use crate::render_graph::resource_handle::RgPassHandle;

    fn image_access(root: usize, state: RgImageState) -> (usize, RgAccessState) {
        (root, RgAccessState::Image(state))
    }

    #[test]
    fn test_write_then_read_transitions_layout() {
        let mut registry = RgResourceRegistry::new();
        let color = registry.register_image("color", RgImageDesc::default(), Some(RgPassHandle::new(0)), None);
        let aliasing = RgAliasingPlan::default();

        let read = RgImageState::shader_read(vk::PipelineStageFlags2::FRAGMENT_SHADER);
        let ordered = vec![
            RgPassAccessSummary {
                pass: 0,
                accesses: vec![image_access(color.index(), RgImageState::COLOR_ATTACHMENT_WRITE)],
            },
            RgPassAccessSummary {
                pass: 1,
                accesses: vec![image_access(color.index(), read)],
            },
            RgPassAccessSummary {
                pass: 2,
                accesses: vec![image_access(color.index(), read)],
            },
        ];
        let plan = BarrierCalculator::new(&registry, &aliasing).compute(3, &ordered);

        // 帧初等待上一帧的最后一次读取
        let first = &plan.passes[0].image_barriers[0];
        assert_eq!(first.src_state, RgImageState::new(read.stage, read.access, vk::ImageLayout::UNDEFINED));
        assert_eq!(plan.passes[1].image_barrier_count(), 1);
        let barrier = &plan.passes[1].image_barriers[0];
        assert_eq!(barrier.src_state.layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(barrier.dst_state.layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert!(barrier.has_layout_transition());
        // 相同状态的重复读取不需要 barrier
        assert!(!plan.passes[2].has_barriers());
        assert!(!plan.trailing.has_barriers());
    }

    #[test]
    fn test_consecutive_writes_are_synchronized() {
        let mut registry = RgResourceRegistry::new();
        let image = registry.register_image("accum", RgImageDesc::default(), Some(RgPassHandle::new(0)), None);
        let buffer = registry.register_buffer("counters", RgBufferDesc::default(), Some(RgPassHandle::new(0)));
        let aliasing = RgAliasingPlan::default();

        let stage = vk::PipelineStageFlags2::COMPUTE_SHADER;
        let image_rw = RgImageState::storage_read_write(stage);
        let buffer_rw = RgAccessState::Buffer(RgBufferState::storage_read_write(stage));
        let ordered = vec![
            RgPassAccessSummary {
                pass: 0,
                accesses: vec![
                    image_access(image.index(), RgImageState::storage_write(stage)),
                    (buffer.index(), RgAccessState::Buffer(RgBufferState::storage_write(stage))),
                ],
            },
            RgPassAccessSummary {
                pass: 1,
                accesses: vec![image_access(image.index(), image_rw), (buffer.index(), buffer_rw)],
            },
            RgPassAccessSummary {
                pass: 2,
                accesses: vec![image_access(image.index(), image_rw), (buffer.index(), buffer_rw)],
            },
        ];
        let plan = BarrierCalculator::new(&registry, &aliasing).compute(3, &ordered);

        for pass in 0..3 {
            assert_eq!(plan.passes[pass].image_barrier_count(), 1, "image barrier before pass {}", pass);
            assert_eq!(plan.passes[pass].buffer_barrier_count(), 1, "buffer barrier before pass {}", pass);
        }
        // 状态相同也要插入 barrier
        let image_barrier = &plan.passes[2].image_barriers[0];
        assert_eq!(image_barrier.src_state, image_rw);
        assert_eq!(image_barrier.dst_state, image_rw);
        assert!(!image_barrier.has_layout_transition());
        assert_eq!(plan.passes[2].buffer_barriers[0].src_state.access, buffer_rw.access());
    }

    #[test]
    fn test_first_access_waits_on_previous_frame() {
        let mut registry = RgResourceRegistry::new();
        let bloom = registry.register_image("bloom", RgImageDesc::default(), Some(RgPassHandle::new(0)), None);
        let aliasing = RgAliasingPlan {
            slots: vec![RgAliasSlot {
                kind: RgResourceKind::Image,
                families: vec![bloom.index()],
                end: 2,
                shareable: true,
            }],
            slot_of_family: [(bloom.index(), 0)].into_iter().collect(),
        };

        let write = RgImageState::storage_write(vk::PipelineStageFlags2::COMPUTE_SHADER);
        let read = RgImageState::shader_read(vk::PipelineStageFlags2::FRAGMENT_SHADER);
        let ordered = vec![
            RgPassAccessSummary { pass: 0, accesses: vec![image_access(bloom.index(), write)] },
            RgPassAccessSummary { pass: 1, accesses: vec![image_access(bloom.index(), read)] },
        ];
        let plan = BarrierCalculator::new(&registry, &aliasing).compute(2, &ordered);

        let first = &plan.passes[0].image_barriers[0];
        assert_eq!(first.src_state.stage, vk::PipelineStageFlags2::FRAGMENT_SHADER);
        assert_eq!(first.src_state.access, vk::AccessFlags2::SHADER_SAMPLED_READ);
        assert_eq!(first.src_state.layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(first.dst_state, write);
    }

    #[test]
    fn test_aliased_family_starts_from_previous_occupant() {
        let mut registry = RgResourceRegistry::new();
        let a = registry.register_image("a", RgImageDesc::default(), Some(RgPassHandle::new(0)), None);
        let b = registry.register_image("b", RgImageDesc::default(), Some(RgPassHandle::new(2)), None);
        let aliasing = RgAliasingPlan {
            slots: vec![RgAliasSlot {
                kind: RgResourceKind::Image,
                families: vec![a.index(), b.index()],
                end: 3,
                shareable: true,
            }],
            slot_of_family: [(a.index(), 0), (b.index(), 0)].into_iter().collect(),
        };

        let read = RgImageState::shader_read(vk::PipelineStageFlags2::COMPUTE_SHADER);
        let write = RgImageState::storage_write(vk::PipelineStageFlags2::COMPUTE_SHADER);
        let ordered = vec![
            RgPassAccessSummary { pass: 0, accesses: vec![image_access(a.index(), write)] },
            RgPassAccessSummary { pass: 1, accesses: vec![image_access(a.index(), read)] },
            RgPassAccessSummary { pass: 2, accesses: vec![image_access(b.index(), write)] },
        ];
        let plan = BarrierCalculator::new(&registry, &aliasing).compute(3, &ordered);

        let handoff = &plan.passes[2].image_barriers[0];
        assert_eq!(handoff.src_state.stage, vk::PipelineStageFlags2::COMPUTE_SHADER);
        assert_eq!(handoff.src_state.layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(handoff.dst_state, write);
    }
}
