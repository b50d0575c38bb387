use crate::{error::InternalError, value::Value};
use derive_more::Display;

/// Default number of variable slots a frame may hold.
pub const DEFAULT_FRAME_CAPACITY: usize = 4096;

///
/// VarSlot
/// Absolute variable offset within a frame, assigned by the compiler.
///

#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
#[display("${_0}")]
pub struct VarSlot(pub usize);

///
/// FrameBlock
/// A compiler-assigned range of variable slots that is live only while the
/// block is entered.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FrameBlock {
    pub offset: usize,
    pub size: usize,
}

impl FrameBlock {
    #[must_use]
    pub const fn new(offset: usize, size: usize) -> Self {
        Self { offset, size }
    }

    #[must_use]
    pub const fn slot(&self, index: usize) -> VarSlot {
        VarSlot(self.offset + index)
    }

    fn end(&self) -> Result<usize, InternalError> {
        self.offset.checked_add(self.size).ok_or_else(|| {
            InternalError::interpreter_invariant(format!(
                "frame block at {} with size {} overflows",
                self.offset, self.size
            ))
        })
    }
}

///
/// Frame
///
/// Variable stack of one interpreted call. Blocks are entered with
/// [`Frame::block`]; their slots start empty and whatever was stored there
/// before is restored on exit, so bindings never leak to the enclosing code.
///

#[derive(Debug)]
pub struct Frame {
    vars: Vec<Option<Value>>,
    capacity: usize,
    depth: usize,
}

impl Frame {
    #[must_use]
    pub const fn new() -> Self {
        Self::with_capacity(DEFAULT_FRAME_CAPACITY)
    }

    #[must_use]
    pub const fn with_capacity(capacity: usize) -> Self {
        Self {
            vars: Vec::new(),
            capacity,
            depth: 0,
        }
    }

    /// Number of blocks currently entered.
    #[must_use]
    pub const fn depth(&self) -> usize {
        self.depth
    }

    /// Run `f` inside `block`, restoring the block's slots afterwards.
    pub fn block<R>(
        &mut self,
        block: FrameBlock,
        f: impl FnOnce(&mut Self) -> Result<R, InternalError>,
    ) -> Result<R, InternalError> {
        let end = block.end()?;
        if end > self.capacity {
            return Err(InternalError::interpreter_invariant(format!(
                "frame block [{}..{end}) exceeds frame capacity {}",
                block.offset, self.capacity
            )));
        }

        if self.vars.len() < end {
            self.vars.resize(end, None);
        }

        let saved: Vec<Option<Value>> = self.vars[block.offset..end]
            .iter_mut()
            .map(Option::take)
            .collect();
        self.depth += 1;

        let result = f(self);

        self.depth -= 1;
        for (slot, value) in self.vars[block.offset..end].iter_mut().zip(saved) {
            *slot = value;
        }

        result
    }

    pub fn get(&self, slot: VarSlot) -> Result<&Value, InternalError> {
        self.vars
            .get(slot.0)
            .and_then(Option::as_ref)
            .ok_or_else(|| {
                InternalError::interpreter_invariant(format!("variable {slot} is not initialized"))
            })
    }

    pub fn set(&mut self, slot: VarSlot, value: Value) -> Result<(), InternalError> {
        match self.vars.get_mut(slot.0) {
            Some(var) => {
                *var = Some(value);
                Ok(())
            }
            None => Err(InternalError::interpreter_invariant(format!(
                "variable {slot} is outside every entered block"
            ))),
        }
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_bindings_do_not_leak() {
        let mut frame = Frame::new();
        let block = FrameBlock::new(0, 2);

        frame
            .block(block, |f| {
                f.set(block.slot(0), Value::Int(1))?;
                assert_eq!(f.depth(), 1);
                assert_eq!(f.get(block.slot(0))?, &Value::Int(1));
                Ok(())
            })
            .expect("block");

        assert_eq!(frame.depth(), 0);
        assert!(frame.get(block.slot(0)).is_err());
    }

    #[test]
    fn nested_entry_restores_outer_bindings() {
        let mut frame = Frame::new();
        let block = FrameBlock::new(3, 1);

        frame
            .block(block, |outer| {
                outer.set(block.slot(0), Value::text("outer"))?;
                outer.block(block, |inner| {
                    assert!(inner.get(block.slot(0)).is_err());
                    inner.set(block.slot(0), Value::text("inner"))
                })?;
                assert_eq!(outer.get(block.slot(0))?, &Value::text("outer"));
                Ok(())
            })
            .expect("nested blocks");
    }

    #[test]
    fn block_is_restored_on_error() {
        let mut frame = Frame::new();
        let block = FrameBlock::new(0, 1);

        let err = frame
            .block(block, |f| -> Result<(), InternalError> {
                f.set(block.slot(0), Value::Int(9))?;
                Err(InternalError::executor_invariant("boom"))
            })
            .unwrap_err();

        assert_eq!(err.message, "boom");
        assert_eq!(frame.depth(), 0);
        assert!(frame.get(block.slot(0)).is_err());
    }

    #[test]
    fn capacity_is_bounded() {
        let mut frame = Frame::with_capacity(4);
        let err = frame
            .block(FrameBlock::new(2, 3), |_| Ok(()))
            .unwrap_err();

        assert!(err.is_invariant_violation());
    }

    #[test]
    fn overflowing_block_is_an_invariant_violation() {
        let mut frame = Frame::new();
        let err = frame
            .block(FrameBlock::new(usize::MAX, 2), |_| Ok(()))
            .unwrap_err();

        assert!(err.is_invariant_violation());
        assert!(err.message.contains("overflows"));
        assert_eq!(frame.depth(), 0);
    }
}
