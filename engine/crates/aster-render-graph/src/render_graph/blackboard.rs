//! 跨 Pass 共享数据的黑板
//!
//! 每种类型最多一个实例。setup 阶段写入，execute 阶段只读。

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::collections::hash_map::Entry;

#[derive(Default)]
pub struct RgBlackboard {
    entries: HashMap<TypeId, Box<dyn Any>>,
}

impl RgBlackboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入 `T` 的默认值并返回可变引用
    ///
    /// # Panics
    /// 已存在 `T` 时 panic。
    pub fn insert<T: Default + 'static>(&mut self) -> &mut T {
        match self.entries.entry(TypeId::of::<T>()) {
            Entry::Occupied(_) => panic!("RgBlackboard: {} already inserted", type_name::<T>()),
            Entry::Vacant(slot) => slot
                .insert(Box::new(T::default()))
                .downcast_mut::<T>()
                .unwrap_or_else(|| unreachable!()),
        }
    }

    /// # Panics
    /// 不存在 `T` 时 panic。
    pub fn get<T: 'static>(&self) -> &T {
        self.try_get::<T>().unwrap_or_else(|| panic!("RgBlackboard: {} not found", type_name::<T>()))
    }

    /// # Panics
    /// 不存在 `T` 时 panic。
    pub fn get_mut<T: 'static>(&mut self) -> &mut T {
        self.entries
            .get_mut(&TypeId::of::<T>())
            .and_then(|entry| entry.downcast_mut::<T>())
            .unwrap_or_else(|| panic!("RgBlackboard: {} not found", type_name::<T>()))
    }

    #[inline]
    pub fn try_get<T: 'static>(&self) -> Option<&T> {
        self.entries.get(&TypeId::of::<T>()).and_then(|entry| entry.downcast_ref::<T>())
    }

    #[inline]
    pub fn contains<T: 'static>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<T>())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
