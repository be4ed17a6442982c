//! 依赖图构建和拓扑排序
//!
//! 从资源记录中的 producer / readers 推导 Pass 之间的边，再用 Kahn 算法排序。

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use super::resource_registry::RgResourceRegistry;

/// 依赖边：从 producer 到 consumer
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DependencyEdge {
    /// 先执行的 Pass
    pub producer: usize,
    /// 后执行的 Pass
    pub consumer: usize,
    /// 产生这条边的资源下标
    pub resources: Vec<usize>,
}

/// 依赖图
pub struct DependencyGraph {
    pass_count: usize,
    /// 邻接表（出边），按加入顺序
    adjacency: Vec<Vec<usize>>,
    in_degrees: Vec<usize>,
    /// 去重后的边，按加入顺序
    edges: Vec<DependencyEdge>,
}

impl DependencyGraph {
    pub fn new(pass_count: usize) -> Self {
        Self {
            pass_count,
            adjacency: vec![Vec::new(); pass_count],
            in_degrees: vec![0; pass_count],
            edges: Vec::new(),
        }
    }

    /// 添加依赖边，同一对 Pass 之间只保留一条，资源列表合并
    pub fn add_edge(&mut self, producer: usize, consumer: usize, resource: usize) {
        if producer == consumer {
            return;
        }

        if let Some(edge) = self.edges.iter_mut().find(|e| e.producer == producer && e.consumer == consumer) {
            if !edge.resources.contains(&resource) {
                edge.resources.push(resource);
            }
            return;
        }

        self.adjacency[producer].push(consumer);
        self.in_degrees[consumer] += 1;
        self.edges.push(DependencyEdge {
            producer,
            consumer,
            resources: vec![resource],
        });
    }

    /// 执行拓扑排序
    ///
    /// 就绪集合按声明序号排序，因此结果是确定的，且没有依赖的 Pass 保持声明时的相对位置。
    ///
    /// # 返回
    /// - `Ok(order)`: 拓扑排序后的 Pass 索引列表
    /// - `Err(remaining)`: 检测到循环依赖，返回所有无法排序的 Pass 索引
    pub fn topological_sort(&self) -> Result<Vec<usize>, Vec<usize>> {
        let mut in_degrees = self.in_degrees.clone();
        let mut ready: BinaryHeap<Reverse<usize>> =
            (0..self.pass_count).filter(|&i| in_degrees[i] == 0).map(Reverse).collect();
        let mut result = Vec::with_capacity(self.pass_count);

        while let Some(Reverse(node)) = ready.pop() {
            result.push(node);

            for &neighbor in &self.adjacency[node] {
                in_degrees[neighbor] -= 1;
                if in_degrees[neighbor] == 0 {
                    ready.push(Reverse(neighbor));
                }
            }
        }

        if result.len() != self.pass_count {
            let remaining: Vec<usize> = (0..self.pass_count).filter(|&i| in_degrees[i] > 0).collect();
            Err(remaining)
        } else {
            Ok(result)
        }
    }

    /// 获取 Pass 的直接前驱
    pub fn get_predecessors(&self, pass_index: usize) -> Vec<usize> {
        self.edges.iter().filter(|e| e.consumer == pass_index).map(|e| e.producer).collect()
    }

    /// 获取 Pass 的直接后继
    pub fn get_successors(&self, pass_index: usize) -> &[usize] {
        &self.adjacency[pass_index]
    }

    pub fn edges(&self) -> &[DependencyEdge] {
        &self.edges
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}

/// 依赖分析器
pub struct DependencyAnalyzer;

impl DependencyAnalyzer {
    /// 从资源记录构建依赖图
    ///
    /// 规则：
    /// - 写后读：每个 reader 依赖该版本的 producer
    /// - 读后写：版本 n 的每个 reader 先于版本 n+1 的 producer（两个版本共享内存）
    pub fn analyze(registry: &RgResourceRegistry, pass_count: usize) -> DependencyGraph {
        let mut graph = DependencyGraph::new(pass_count);

        for (index, resource) in registry.iter() {
            if let Some(producer) = resource.producer {
                for reader in &resource.readers {
                    graph.add_edge(producer.index(), reader.index(), index);
                }
            }

            let next_producer = resource.superseded_by.and_then(|next| registry.at(next).producer);
            if let Some(writer) = next_producer {
                for reader in &resource.readers {
                    graph.add_edge(reader.index(), writer.index(), index);
                }
            }
        }

        graph
    }
}
