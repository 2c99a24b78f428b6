use rand::RngCore;
use tracing::trace;

use super::{read, write, LifecycleEvent, SharedTransform, Transform};
use crate::Vec2;

/// Ordered chain of shared transforms.
///
/// `forward` applies the children front to back, `backward` back to front,
/// so the chain inverts whenever every child does.
#[derive(Debug, Clone, Default)]
pub struct CompositeTransform {
    children: Vec<SharedTransform>,
}

impl CompositeTransform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a transform at the image end of the chain.
    pub fn push_back(&mut self, transform: SharedTransform) {
        self.children.push(transform);
    }

    /// Prepend a transform at the object end of the chain.
    pub fn push_front(&mut self, transform: SharedTransform) {
        self.children.insert(0, transform);
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn children(&self) -> &[SharedTransform] {
        &self.children
    }
}

impl Transform for CompositeTransform {
    fn forward(&self, p: Vec2) -> Vec2 {
        self.children.iter().fold(p, |q, t| read(t).forward(q))
    }

    fn backward(&self, p: Vec2) -> Vec2 {
        self.children.iter().rev().fold(p, |q, t| read(t).backward(q))
    }

    fn forward_batch(&self, points: &[Vec2]) -> Vec<Vec2> {
        let mut out = points.to_vec();
        for t in &self.children {
            out = read(t).forward_batch(&out);
        }
        out
    }

    fn backward_batch(&self, points: &[Vec2]) -> Vec<Vec2> {
        let mut out = points.to_vec();
        for t in self.children.iter().rev() {
            out = read(t).backward_batch(&out);
        }
        out
    }

    fn generate(&mut self, event: LifecycleEvent, rng: &mut dyn RngCore) {
        for t in &self.children {
            let mut child = write(t);
            trace!("{:?} -> {}", event, child.describe());
            child.generate(event, rng);
        }
    }

    fn describe(&self) -> String {
        let names: Vec<String> = self.children.iter().map(|t| read(t).describe()).collect();
        format!("composite[{}]", names.join(" -> "))
    }
}
