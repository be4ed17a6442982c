use super::buffer_resource::RgBufferDesc;
use super::image_resource::RgImageDesc;
use super::resource::{RgClearValue, RgImportInfo, RgResource, RgResourceKind, RgUsageMask};
use super::resource_handle::{RgPassHandle, RgResourceHandle};

/// 资源注册表
///
/// 扁平存储所有资源版本与描述；资源通过下标引用描述，新版本与旧版本共享描述。
#[derive(Default)]
pub struct RgResourceRegistry {
    resources: Vec<RgResource>,
    image_descs: Vec<RgImageDesc>,
    buffer_descs: Vec<RgBufferDesc>,
}

// register
impl RgResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_image(
        &mut self,
        name: impl Into<String>,
        desc: RgImageDesc,
        producer: Option<RgPassHandle>,
        clear_value: Option<RgClearValue>,
    ) -> RgResourceHandle {
        self.image_descs.push(desc);
        let desc_index = self.image_descs.len() - 1;
        self.push_root(name.into(), RgResourceKind::Image, desc_index, producer, clear_value)
    }

    pub fn register_buffer(
        &mut self,
        name: impl Into<String>,
        desc: RgBufferDesc,
        producer: Option<RgPassHandle>,
    ) -> RgResourceHandle {
        self.buffer_descs.push(desc);
        let desc_index = self.buffer_descs.len() - 1;
        self.push_root(name.into(), RgResourceKind::Buffer, desc_index, producer, None)
    }

    fn push_root(
        &mut self,
        name: String,
        kind: RgResourceKind,
        desc_index: usize,
        producer: Option<RgPassHandle>,
        clear_value: Option<RgClearValue>,
    ) -> RgResourceHandle {
        let index = self.resources.len();
        self.resources.push(RgResource {
            name,
            kind,
            desc_index,
            version: 0,
            producer,
            readers: Vec::new(),
            clear_value,
            usage: RgUsageMask::default(),
            root: index,
            superseded_by: None,
            import: None,
            export: None,
        });
        RgResourceHandle::new(index, 0)
    }

    /// 标记为外部导入
    pub fn set_import(&mut self, handle: RgResourceHandle, import: RgImportInfo) {
        self.get_mut(handle).import = Some(import);
    }

    /// 为 read-modify-write 生成下一个版本
    ///
    /// 新记录复制描述下标、名称与 family，版本号加一，producer 为写入的 Pass。
    pub fn next_version(&mut self, handle: RgResourceHandle, producer: RgPassHandle) -> RgResourceHandle {
        let index = self.resources.len();
        let prev = self.get_mut(handle);
        debug_assert!(prev.superseded_by.is_none());
        prev.superseded_by = Some(index);

        let next = RgResource {
            name: prev.name.clone(),
            kind: prev.kind,
            desc_index: prev.desc_index,
            version: prev.version + 1,
            producer: Some(producer),
            readers: Vec::new(),
            clear_value: None,
            usage: RgUsageMask::default(),
            root: prev.root,
            superseded_by: None,
            import: prev.import,
            export: None,
        };
        let version = next.version;
        self.resources.push(next);
        RgResourceHandle::new(index, version)
    }
}

// getter & iter
impl RgResourceRegistry {
    /// 获取资源记录
    ///
    /// 句柄必须由本注册表发出，且版本与记录一致。
    #[inline]
    pub fn get(&self, handle: RgResourceHandle) -> &RgResource {
        let resource = self
            .resources
            .get(handle.index())
            .unwrap_or_else(|| panic!("RenderGraph: unknown resource handle {:?}", handle));
        assert_eq!(
            resource.version,
            handle.version(),
            "RenderGraph: handle {:?} does not match resource '{}' v{}",
            handle,
            resource.name,
            resource.version
        );
        resource
    }

    #[inline]
    pub fn get_mut(&mut self, handle: RgResourceHandle) -> &mut RgResource {
        let resource = self
            .resources
            .get_mut(handle.index())
            .unwrap_or_else(|| panic!("RenderGraph: unknown resource handle {:?}", handle));
        assert_eq!(
            resource.version,
            handle.version(),
            "RenderGraph: handle {:?} does not match resource '{}' v{}",
            handle,
            resource.name,
            resource.version
        );
        resource
    }

    /// 按下标获取资源记录
    #[inline]
    pub fn at(&self, index: usize) -> &RgResource {
        &self.resources[index]
    }

    /// 下标对应的句柄
    #[inline]
    pub fn handle_of(&self, index: usize) -> RgResourceHandle {
        RgResourceHandle::new(index, self.resources[index].version)
    }

    #[inline]
    pub fn image_desc(&self, desc_index: usize) -> Option<&RgImageDesc> {
        self.image_descs.get(desc_index)
    }

    #[inline]
    pub fn buffer_desc(&self, desc_index: usize) -> Option<&RgBufferDesc> {
        self.buffer_descs.get(desc_index)
    }

    #[cfg(test)]
    pub(crate) fn image_desc_mut(&mut self, desc_index: usize) -> Option<&mut RgImageDesc> {
        self.image_descs.get_mut(desc_index)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (usize, &RgResource)> {
        self.resources.iter().enumerate()
    }

    /// 所有 family 的根下标
    pub fn roots(&self) -> impl Iterator<Item = usize> + '_ {
        self.resources.iter().enumerate().filter(|(index, r)| r.root == *index).map(|(index, _)| index)
    }

    /// family 中所有版本的下标，按版本递增
    pub fn family(&self, root: usize) -> impl Iterator<Item = usize> + '_ {
        std::iter::successors(Some(root), move |&index| self.resources[index].superseded_by)
    }

    /// family 所有版本用法的并集
    pub fn family_usage(&self, root: usize) -> RgUsageMask {
        self.family(root).fold(RgUsageMask::default(), |mask, index| mask.union(self.resources[index].usage))
    }
}
