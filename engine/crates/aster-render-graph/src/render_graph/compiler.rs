//! 编译流程
//!
//! 校验描述 → 构建依赖并排序 → 生命周期 → 别名分配 → barrier 推导。
//! 尺寸解析和物理资源分配依赖 swapchain 尺寸，在 compile 和 resize 中都会执行。

use std::collections::{BTreeMap, HashMap};

use ash::vk;
use itertools::Itertools;

use super::barrier::{BarrierCalculator, RgBarrierPlan, RgPassAccessSummary};
use super::error::RgCompileError;
use super::graph::{DependencyAnalyzer, DependencyGraph};
use super::image_resource::RgSizePolicy;
use super::lifetime::{self, RgAliasingPlan, RgLifetime};
use super::pass::RgPassNode;
use super::physical::{RgPhysicalPool, RgRealizeStats, RgSlotRequest};
use super::resource::RgResourceKind;
use super::resource_handle::RgPassHandle;
use super::resource_registry::RgResourceRegistry;
use super::settings::RgSettings;
use crate::device::{RgBufferCreateInfo, RgDevice, RgImageCreateInfo};

/// 编译结果
pub struct RgCompiledGraph {
    /// 执行顺序
    pub order: Vec<RgPassHandle>,
    /// Pass 声明序号 -> 执行位置
    pub positions: Vec<usize>,
    pub dependencies: DependencyGraph,
    /// 每个资源版本的生命周期
    pub lifetimes: Vec<RgLifetime>,
    /// family 根下标 -> 合并后的生命周期
    pub families: BTreeMap<usize, RgLifetime>,
    pub aliasing: RgAliasingPlan,
    pub barriers: RgBarrierPlan,
}

pub struct RgCompiler<'a, D: RgDevice> {
    registry: &'a RgResourceRegistry,
    passes: &'a [RgPassNode<D>],
    settings: &'a RgSettings,
}

impl<'a, D: RgDevice> RgCompiler<'a, D> {
    pub fn new(registry: &'a RgResourceRegistry, passes: &'a [RgPassNode<D>], settings: &'a RgSettings) -> Self {
        Self {
            registry,
            passes,
            settings,
        }
    }

    pub fn compile(&self) -> Result<RgCompiledGraph, RgCompileError> {
        self.validate()?;

        let dependencies = DependencyAnalyzer::analyze(self.registry, self.passes.len());
        let order_indices = dependencies.topological_sort().map_err(|remaining| RgCompileError::Cycle {
            passes: remaining.iter().map(|&i| self.passes[i].name.clone()).collect(),
        })?;

        let mut positions = vec![0; self.passes.len()];
        for (position, &pass) in order_indices.iter().enumerate() {
            positions[pass] = position;
        }

        let lifetimes = lifetime::compute_lifetimes(self.registry, &positions);
        let families = lifetime::family_lifetimes(self.registry, &lifetimes);
        let aliasing = lifetime::assign_aliases(self.registry, &families, self.settings.enable_aliasing);
        lifetime::verify_aliases(self.registry, &families, &aliasing)?;

        let summaries = order_indices
            .iter()
            .map(|&pass| RgPassAccessSummary::fold(pass, self.registry, self.passes[pass].accesses()))
            .collect_vec();
        let barriers = BarrierCalculator::new(self.registry, &aliasing).compute(self.passes.len(), &summaries);

        Ok(RgCompiledGraph {
            order: order_indices.into_iter().map(RgPassHandle::new).collect(),
            positions,
            dependencies,
            lifetimes,
            families,
            aliasing,
            barriers,
        })
    }

    /// 校验描述与导出
    fn validate(&self) -> Result<(), RgCompileError> {
        for (index, resource) in self.registry.iter() {
            if resource.export.is_some() && resource.superseded_by.is_some() {
                return Err(RgCompileError::ExportSuperseded {
                    resource: resource.name.clone(),
                    version: resource.version,
                });
            }

            // 描述由 family 共享，只需检查根
            if resource.root != index {
                continue;
            }

            let missing = || RgCompileError::MissingDescription {
                resource: resource.name.clone(),
                desc_index: resource.desc_index,
            };

            match resource.kind {
                RgResourceKind::Image => {
                    let desc = self.registry.image_desc(resource.desc_index).ok_or_else(missing)?;
                    if desc.mip_levels == 0 || desc.array_layers == 0 {
                        return Err(RgCompileError::ZeroMipsOrLayers {
                            resource: resource.name.clone(),
                        });
                    }
                    let (width, height) = match desc.size {
                        RgSizePolicy::Absolute { width, height } => (width, height),
                        _ => (1, 1),
                    };
                    if width == 0 || height == 0 || desc.depth == 0 {
                        return Err(RgCompileError::ZeroSizedImage {
                            resource: resource.name.clone(),
                            width,
                            height,
                            depth: desc.depth,
                        });
                    }
                    match desc.size {
                        RgSizePolicy::SwapchainRelative { scale_x, scale_y }
                        | RgSizePolicy::InputRelative { scale_x, scale_y, .. } => {
                            if !(scale_x.is_finite() && scale_y.is_finite() && scale_x > 0.0 && scale_y > 0.0) {
                                return Err(RgCompileError::InvalidSizePolicy {
                                    resource: resource.name.clone(),
                                    reason: format!("scale ({}, {}) must be positive", scale_x, scale_y),
                                });
                            }
                        }
                        RgSizePolicy::Absolute { .. } => {}
                    }
                }
                RgResourceKind::Buffer => {
                    let desc = self.registry.buffer_desc(resource.desc_index).ok_or_else(missing)?;
                    if desc.size == 0 {
                        return Err(RgCompileError::ZeroSizedBuffer {
                            resource: resource.name.clone(),
                        });
                    }
                }
            }
        }

        // 相对尺寸的引用关系在这里用单位尺寸试解析一遍
        resolve_extents(self.registry, vk::Extent2D { width: 1, height: 1 })?;
        Ok(())
    }
}

/// 解析所有图像 family 的二维尺寸，key 为 family 根下标
pub fn resolve_extents(
    registry: &RgResourceRegistry,
    swapchain: vk::Extent2D,
) -> Result<HashMap<usize, vk::Extent2D>, RgCompileError> {
    let mut resolved = HashMap::new();
    for root in registry.roots() {
        if registry.at(root).kind == RgResourceKind::Image {
            let mut visiting = Vec::new();
            resolve_extent(registry, root, swapchain, &mut resolved, &mut visiting)?;
        }
    }
    Ok(resolved)
}

fn resolve_extent(
    registry: &RgResourceRegistry,
    root: usize,
    swapchain: vk::Extent2D,
    resolved: &mut HashMap<usize, vk::Extent2D>,
    visiting: &mut Vec<usize>,
) -> Result<vk::Extent2D, RgCompileError> {
    if let Some(extent) = resolved.get(&root) {
        return Ok(*extent);
    }

    let resource = registry.at(root);
    let invalid = |reason: String| RgCompileError::InvalidSizePolicy {
        resource: resource.name.clone(),
        reason,
    };
    let desc = registry.image_desc(resource.desc_index).ok_or_else(|| RgCompileError::MissingDescription {
        resource: resource.name.clone(),
        desc_index: resource.desc_index,
    })?;

    let extent = match desc.size {
        RgSizePolicy::Absolute { width, height } => vk::Extent2D { width, height },
        RgSizePolicy::SwapchainRelative { scale_x, scale_y } => RgSizePolicy::scale(swapchain, scale_x, scale_y),
        RgSizePolicy::InputRelative {
            resource: input,
            scale_x,
            scale_y,
        } => {
            if input.index() >= registry.len() {
                return Err(invalid(format!("{:?} does not exist", input)));
            }
            let input_resource = registry.at(input.index());
            if input_resource.kind != RgResourceKind::Image {
                return Err(invalid(format!("'{}' is a buffer", input_resource.name)));
            }
            let input_root = input_resource.root;
            if input_root == root || visiting.contains(&input_root) {
                return Err(invalid(format!("size depends on itself through '{}'", input_resource.name)));
            }

            visiting.push(root);
            let base = resolve_extent(registry, input_root, swapchain, resolved, visiting)?;
            visiting.pop();
            RgSizePolicy::scale(base, scale_x, scale_y)
        }
    };

    resolved.insert(root, extent);
    Ok(extent)
}

/// family 的图像创建参数；usage 为描述中的 usage 与所有版本声明用法的并集
fn image_create_info(
    registry: &RgResourceRegistry,
    root: usize,
    extents: &HashMap<usize, vk::Extent2D>,
) -> Option<RgImageCreateInfo> {
    let resource = registry.at(root);
    let desc = registry.image_desc(resource.desc_index)?;
    let extent = extents.get(&root)?;
    Some(RgImageCreateInfo {
        extent: vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: desc.depth,
        },
        format: desc.format,
        usage: desc.usage | registry.family_usage(root).image_usage(desc.is_depth()),
        mip_levels: desc.mip_levels,
        array_layers: desc.array_layers,
        samples: desc.samples,
        image_type: desc.image_type,
    })
}

fn buffer_create_info(registry: &RgResourceRegistry, root: usize) -> Option<RgBufferCreateInfo> {
    let resource = registry.at(root);
    let desc = registry.buffer_desc(resource.desc_index)?;
    Some(RgBufferCreateInfo {
        size: desc.size,
        usage: desc.usage | registry.family_usage(root).buffer_usage(),
    })
}

/// 每个别名槽位的物理资源需求
pub fn slot_requests(
    registry: &RgResourceRegistry,
    aliasing: &RgAliasingPlan,
    extents: &HashMap<usize, vk::Extent2D>,
) -> Vec<RgSlotRequest> {
    aliasing
        .slots
        .iter()
        .filter_map(|slot| {
            let name = slot.families.iter().map(|&root| registry.at(root).name.as_str()).join("|");
            let aliases = slot.families.iter().flat_map(|&root| registry.family(root)).collect_vec();

            match slot.kind {
                RgResourceKind::Image => {
                    let info = slot
                        .families
                        .iter()
                        .filter_map(|&root| image_create_info(registry, root, extents))
                        .reduce(|mut merged, info| {
                            merged.usage |= info.usage;
                            merged
                        })?;
                    Some(RgSlotRequest::Image { name, info, aliases })
                }
                RgResourceKind::Buffer => {
                    let info = slot
                        .families
                        .iter()
                        .filter_map(|&root| buffer_create_info(registry, root))
                        .reduce(|mut merged, info| {
                            merged.usage |= info.usage;
                            merged
                        })?;
                    Some(RgSlotRequest::Buffer { name, info, aliases })
                }
            }
        })
        .collect()
}

/// 解析尺寸并让物理池与编译结果一致
pub fn realize_physical<D: RgDevice>(
    registry: &RgResourceRegistry,
    compiled: &RgCompiledGraph,
    device: &mut D,
    pool: &mut RgPhysicalPool<D>,
) -> Result<RgRealizeStats, RgCompileError> {
    let extents = resolve_extents(registry, device.swapchain_extent())?;
    let requests = slot_requests(registry, &compiled.aliasing, &extents);
    let (_, stats) = pool.realize(device, &requests);

    for root in registry.roots() {
        let Some(import) = registry.at(root).import else {
            continue;
        };
        let info = match registry.at(root).kind {
            RgResourceKind::Image => image_create_info(registry, root, &extents),
            RgResourceKind::Buffer => None,
        };
        pool.bind_imported(import.physical, info, registry.family(root).collect());
    }

    pool.rebind(registry.len());
    Ok(stats)
}
