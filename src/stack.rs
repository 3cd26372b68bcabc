//! Symbolic operand stack and block/control-frame stack used while decoding a
//! single function body.

use crate::types::ValType;
use inkwell::basic_block::BasicBlock;
use inkwell::values::BasicValueEnum;

/// One entry on the symbolic operand stack: the IR value and its Wasm type.
#[derive(Clone, Copy, Debug)]
pub struct StackEntry<'ctx> {
    pub value: BasicValueEnum<'ctx>,
    pub ty: ValType,
}

/// The kind of structured control-flow construct a block frame represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameKind {
    Block,
    Loop,
    If,
    Function,
}

/// A pending phi input: a value contributed by one predecessor block, collected at
/// `br`/`br_if`/`br_table`/fallthrough time and joined at the frame's merge point.
#[derive(Clone, Copy, Debug)]
pub struct PhiIncoming<'ctx> {
    pub value: BasicValueEnum<'ctx>,
    pub block: BasicBlock<'ctx>,
}

/// A structured control-flow frame.
pub struct BlockFrame<'ctx> {
    pub kind: FrameKind,
    pub param_types: Vec<ValType>,
    pub result_types: Vec<ValType>,
    /// Where `loop` branches with depth 0 land; for non-loop frames this is the
    /// merge-after-end block.
    pub target_block: BasicBlock<'ctx>,
    /// The block entered after this frame's `end`. For `loop` this differs from
    /// `target_block`; for `block`/`if` they're the same.
    pub merge_block: BasicBlock<'ctx>,
    pub else_block: Option<BasicBlock<'ctx>>,
    /// One accumulator per result slot, each holding the (value, predecessor block)
    /// pairs seen so far for that slot.
    pub incoming: Vec<Vec<PhiIncoming<'ctx>>>,
    pub stack_height_on_entry: usize,
    pub reachable: bool,
}

impl<'ctx> BlockFrame<'ctx> {
    /// Arity used for `br`/`br_if` branch-argument accounting: a loop's target is
    /// its header, so branches to it supply the loop's parameters, not its results.
    pub fn branch_arity(&self) -> usize {
        if self.kind == FrameKind::Loop {
            self.param_types.len()
        } else {
            self.result_types.len()
        }
    }

    pub fn branch_target(&self) -> BasicBlock<'ctx> {
        self.target_block
    }

    pub fn record_incoming(&mut self, values: &[BasicValueEnum<'ctx>], from: BasicBlock<'ctx>) {
        for (slot, v) in values.iter().enumerate() {
            self.incoming[slot].push(PhiIncoming { value: *v, block: from });
        }
    }
}

/// The symbolic operand stack plus the block-frame stack for one function.
pub struct SymbolicStack<'ctx> {
    operands: Vec<StackEntry<'ctx>>,
    frames: Vec<BlockFrame<'ctx>>,
}

impl<'ctx> SymbolicStack<'ctx> {
    pub fn new() -> Self {
        Self {
            operands: Vec::new(),
            frames: Vec::new(),
        }
    }

    pub fn push(&mut self, value: BasicValueEnum<'ctx>, ty: ValType) {
        self.operands.push(StackEntry { value, ty });
    }

    pub fn pop(&mut self) -> StackEntry<'ctx> {
        self.operands
            .pop()
            .expect("symbolic stack underflow: decoder and validator disagree")
    }

    pub fn peek(&self) -> &StackEntry<'ctx> {
        self.operands
            .last()
            .expect("symbolic stack underflow on peek")
    }

    pub fn drop_n(&mut self, n: usize) {
        let new_len = self.operands.len().saturating_sub(n);
        self.operands.truncate(new_len);
    }

    pub fn height(&self) -> usize {
        self.operands.len()
    }

    pub fn truncate(&mut self, height: usize) {
        self.operands.truncate(height);
    }

    pub fn top_n(&self, n: usize) -> &[StackEntry<'ctx>] {
        let len = self.operands.len();
        &self.operands[len - n..]
    }

    pub fn enter_frame(&mut self, frame: BlockFrame<'ctx>) {
        self.frames.push(frame);
    }

    pub fn exit_frame(&mut self) -> BlockFrame<'ctx> {
        self.frames.pop().expect("block frame stack underflow")
    }

    pub fn frame_at_depth(&self, relative_depth: u32) -> &BlockFrame<'ctx> {
        let idx = self.frames.len() - 1 - relative_depth as usize;
        &self.frames[idx]
    }

    pub fn frame_at_depth_mut(&mut self, relative_depth: u32) -> &mut BlockFrame<'ctx> {
        let idx = self.frames.len() - 1 - relative_depth as usize;
        &mut self.frames[idx]
    }

    pub fn current_frame_mut(&mut self) -> &mut BlockFrame<'ctx> {
        self.frames.last_mut().expect("no active block frame")
    }

    pub fn current_frame(&self) -> &BlockFrame<'ctx> {
        self.frames.last().expect("no active block frame")
    }

    pub fn frame_depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_outermost(&self) -> bool {
        self.frames.len() == 1
    }
}
