//! Frames of the pushdown evaluation machine.
//!
//! Each frame pairs an AST node with exactly the progress state its stepper
//! needs, as one variant per node kind plus the machine-synthesized frames
//! (`PendingCall` for accessor dispatch, `EvalBody` for `eval`). All progress
//! lives on the frame, so steppers are re-entrant and the whole machine can
//! be advanced one `step()` at a time.

use std::rc::Rc;

use ahash::AHashSet;
use smallvec::SmallVec;

use crate::{
    ast::{
        AssignOp, CatchClause, Expr, ForInTarget, ForInit, LogicalOp, ObjectProp, PropRef, Span, Stmt, SwitchCase,
        UnaryOp, UpdateOp, VarDeclarator,
    },
    heap::ObjId,
    value::Value,
};

/// Argument buffer for calls; most call sites pass a handful of values.
pub(crate) type Args = SmallVec<[Value; 4]>;

/// What a completed frame hands to its parent: a plain value, or a reference
/// when the parent requested one by pushing the child with `components` set.
#[derive(Debug, Clone)]
pub(crate) enum Outcome {
    Val(Value),
    Reference(RefSlot),
}

/// An assignment/delete/typeof target: a bare name resolved against the
/// scope chain, or a property of a base value.
#[derive(Debug, Clone)]
pub(crate) enum RefSlot {
    Name(Rc<str>),
    Member { base: Value, key: Rc<str> },
}

/// Reason for unwinding the frame stack.
#[derive(Debug, Clone)]
pub(crate) enum Unwind {
    Throw(Value),
    Break(Option<Rc<str>>),
    Continue(Option<Rc<str>>),
    Return(Value),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LoopStage {
    Enter,
    Test,
    Body,
}

/// What a `for` frame is currently waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ForStage {
    Start,
    Init,
    Test,
    Body,
    Update,
}

#[derive(Debug)]
pub(crate) enum ForInStage {
    Start,
    Object,
    NextKey,
    /// Waiting for the target reference of the current key.
    TargetRef { key: Rc<str> },
    /// Waiting for a setter invoked while storing the current key.
    Stored,
    Body,
}

#[derive(Debug)]
pub(crate) enum SwitchStage {
    Start,
    Disc,
    /// Scanning cases for a match; `case_index` is the next case to try.
    FindCase,
    /// Waiting for the current case's test expression.
    TestCase,
    /// Executing consequents from `exec_case`/`exec_index` onward, falling
    /// through subsequent cases until a `break` pops the frame.
    Exec,
}

#[derive(Debug)]
pub(crate) enum TryStage {
    Start,
    Block,
    Handler,
    /// The finalizer is running; `pending` is the unwind to resume once it
    /// completes normally.
    Finalizer { pending: Option<Unwind> },
}

#[derive(Debug)]
pub(crate) enum WithStage {
    Start,
    Object,
    Body,
}

#[derive(Debug)]
pub(crate) enum MemberStage {
    Start,
    Object,
    /// Waiting for the computed property expression.
    Property { base: Value },
    /// Waiting for a getter's return value.
    Getter,
}

#[derive(Debug)]
pub(crate) enum CallStage {
    /// Evaluate the callee as a reference so method calls capture their
    /// receiver.
    Callee { callee: Expr, args: Rc<[Expr]> },
    CalleeDone { args: Rc<[Expr]> },
    /// The callee itself was an accessor property; waiting for its getter.
    CalleeGetter { args: Rc<[Expr]>, this_value: Value },
    Args {
        args: Rc<[Expr]>,
        index: usize,
        func: Value,
        this_value: Value,
        values: Args,
    },
    /// Waiting for the result: a pushed body (user function, eval body or
    /// native-pushed frame), or the completion mailbox of an asynchronous
    /// native.
    Await { receiver: Option<Value> },
}

#[derive(Debug)]
pub(crate) enum PendingStage {
    Start,
    Await,
}

#[derive(Debug)]
pub(crate) enum AssignStage {
    Start,
    Target,
    /// Waiting for the getter that loads the old value of a compound target.
    OldGetter { slot: RefSlot },
    Value { slot: RefSlot, old: Option<Value> },
    /// Waiting for the setter invoked by the store; the stored value is the
    /// expression result regardless of what the setter returns.
    Setter { result: Value },
}

#[derive(Debug)]
pub(crate) enum UpdateStage {
    Start,
    Ref,
    Getter { slot: RefSlot },
    Store { result: Value },
}

#[derive(Debug)]
pub(crate) enum UnaryStage {
    Start,
    Arg,
    /// Waiting for a getter dispatched by `typeof` on an accessor property.
    Getter,
}

#[derive(Debug)]
pub(crate) enum BinaryStage {
    Start,
    Left,
    Right { left: Value },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LogicalStage {
    Start,
    Left,
    Right,
}

#[derive(Debug)]
pub(crate) enum FrameKind {
    /// The program frame; stays on the stack after completion so appended
    /// code can extend it.
    Program { index: usize },
    /// Body of an `eval`: runs over the caller's scope on the same stack and
    /// tracks the last expression-statement value.
    EvalBody {
        body: Rc<[Stmt]>,
        index: usize,
        scope: ObjId,
        this_value: Value,
        value: Value,
    },
    FunctionBody {
        body: Rc<[Stmt]>,
        index: usize,
        scope: ObjId,
        this_value: Value,
    },
    /// A block with its own scope: the body of a `catch` clause.
    ScopedBlock {
        body: Rc<[Stmt]>,
        index: usize,
        scope: ObjId,
    },
    Block {
        body: Rc<[Stmt]>,
        index: usize,
    },
    ExprStmt {
        expr: Expr,
        started: bool,
    },
    VarDecl {
        decls: Rc<[VarDeclarator]>,
        index: usize,
        /// Name whose initializer is currently being evaluated.
        pending: Option<Rc<str>>,
    },
    If {
        test: Expr,
        consequent: Stmt,
        alternate: Option<Stmt>,
        started: bool,
    },
    /// Shared by `while` and `do-while`; the latter runs its body once before
    /// the first test.
    While {
        test: Expr,
        body: Stmt,
        is_do: bool,
        stage: LoopStage,
    },
    For {
        init: Option<ForInit>,
        test: Option<Expr>,
        update: Option<Expr>,
        body: Stmt,
        stage: ForStage,
    },
    ForIn {
        left: ForInTarget,
        right: Expr,
        body: Stmt,
        stage: ForInStage,
        /// Object currently being enumerated (walks up the prototype chain).
        object: Value,
        keys: Vec<Rc<str>>,
        key_index: usize,
        /// Keys already visited, so shadowed prototype properties are skipped.
        visited: AHashSet<Rc<str>>,
    },
    Switch {
        discriminant: Expr,
        cases: Rc<[SwitchCase]>,
        stage: SwitchStage,
        disc: Value,
        case_index: usize,
        default_index: Option<usize>,
        exec_case: usize,
        exec_index: usize,
    },
    Try {
        block: Rc<[Stmt]>,
        handler: Option<Rc<CatchClause>>,
        finalizer: Option<Rc<[Stmt]>>,
        stage: TryStage,
    },
    Throw {
        expr: Expr,
        started: bool,
    },
    Return {
        arg: Option<Expr>,
        started: bool,
    },
    BreakStmt {
        target: Option<Rc<str>>,
    },
    ContinueStmt {
        target: Option<Rc<str>>,
    },
    With {
        object: Expr,
        body: Stmt,
        stage: WithStage,
        scope: Option<ObjId>,
    },

    /// Literals, `this`, function expressions and regex literals: one step,
    /// no children.
    Leaf {
        expr: Expr,
    },
    Ident {
        name: Rc<str>,
        components: bool,
        /// Set while a getter bound to the name is being invoked.
        awaiting: bool,
    },
    ArrayLit {
        elements: Rc<[Option<Expr>]>,
        index: usize,
        target: Option<ObjId>,
    },
    ObjectLit {
        props: Rc<[ObjectProp]>,
        index: usize,
        target: Option<ObjId>,
    },
    Member {
        object: Expr,
        property: PropRef,
        components: bool,
        stage: MemberStage,
    },
    Call {
        is_new: bool,
        stage: CallStage,
    },
    /// Machine-synthesized call with callee and arguments already resolved
    /// (getter/setter dispatch, `apply`/`call`).
    PendingCall {
        func: Value,
        this_value: Value,
        args: Args,
        stage: PendingStage,
    },
    Unary {
        op: UnaryOp,
        argument: Expr,
        stage: UnaryStage,
    },
    Update {
        op: UpdateOp,
        prefix: bool,
        target: Expr,
        stage: UpdateStage,
    },
    Binary {
        op: crate::ast::BinaryOp,
        left: Expr,
        right: Expr,
        stage: BinaryStage,
    },
    Logical {
        op: LogicalOp,
        left: Expr,
        right: Expr,
        stage: LogicalStage,
    },
    Conditional {
        test: Expr,
        consequent: Expr,
        alternate: Expr,
        started: bool,
    },
    Assign {
        op: AssignOp,
        target: Expr,
        value: Expr,
        stage: AssignStage,
    },
    Sequence {
        exprs: Rc<[Expr]>,
        index: usize,
    },
}

#[derive(Debug)]
pub(crate) struct Frame {
    pub kind: FrameKind,
    pub label: Option<Rc<str>>,
    pub span: Option<Span>,
}

impl Frame {
    pub(crate) fn new(kind: FrameKind, span: Option<Span>) -> Self {
        Self {
            kind,
            label: None,
            span,
        }
    }

    pub(crate) fn with_label(mut self, label: Option<Rc<str>>) -> Self {
        self.label = label;
        self
    }

    /// Whether `break`/`continue` target this frame.
    pub(crate) fn is_loop(&self) -> bool {
        matches!(
            self.kind,
            FrameKind::While { .. } | FrameKind::For { .. } | FrameKind::ForIn { .. }
        )
    }

    pub(crate) fn is_switch(&self) -> bool {
        matches!(self.kind, FrameKind::Switch { .. })
    }

    /// Static name of the frame kind, for tracing.
    pub(crate) fn kind_name(&self) -> &'static str {
        match &self.kind {
            FrameKind::Program { .. } => "Program",
            FrameKind::EvalBody { .. } => "EvalBody",
            FrameKind::FunctionBody { .. } => "FunctionBody",
            FrameKind::ScopedBlock { .. } => "ScopedBlock",
            FrameKind::Block { .. } => "Block",
            FrameKind::ExprStmt { .. } => "ExprStmt",
            FrameKind::VarDecl { .. } => "VarDecl",
            FrameKind::If { .. } => "If",
            FrameKind::While { .. } => "While",
            FrameKind::For { .. } => "For",
            FrameKind::ForIn { .. } => "ForIn",
            FrameKind::Switch { .. } => "Switch",
            FrameKind::Try { .. } => "Try",
            FrameKind::Throw { .. } => "Throw",
            FrameKind::Return { .. } => "Return",
            FrameKind::BreakStmt { .. } => "Break",
            FrameKind::ContinueStmt { .. } => "Continue",
            FrameKind::With { .. } => "With",
            FrameKind::Leaf { .. } => "Leaf",
            FrameKind::Ident { .. } => "Ident",
            FrameKind::ArrayLit { .. } => "ArrayLit",
            FrameKind::ObjectLit { .. } => "ObjectLit",
            FrameKind::Member { .. } => "Member",
            FrameKind::Call { .. } => "Call",
            FrameKind::PendingCall { .. } => "PendingCall",
            FrameKind::Unary { .. } => "Unary",
            FrameKind::Update { .. } => "Update",
            FrameKind::Binary { .. } => "Binary",
            FrameKind::Logical { .. } => "Logical",
            FrameKind::Conditional { .. } => "Conditional",
            FrameKind::Assign { .. } => "Assign",
            FrameKind::Sequence { .. } => "Sequence",
        }
    }
}
