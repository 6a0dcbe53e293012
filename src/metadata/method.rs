//! Method definitions and the optimization-info record.
//!
//! A [`MethodDefinition`] owns its interned reference, access flags, optional
//! SSA body, and an [`OptimizationInfo`] record that analyses populate. The
//! optimization info is a sum of monotonically accumulating facts: each field
//! is a small lattice, refinement is join, and readers treat absence as the
//! least informative value. Facts are never weakened between lens-producing
//! passes.

use bitflags::bitflags;
use strum::Display;

use crate::{
    ir::IrCode,
    metadata::interner::{FieldRef, MethodRef},
};

bitflags! {
    /// Method access and property flags, dex encoding.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MethodAccessFlags: u32 {
        /// Publicly accessible.
        const PUBLIC = 0x0001;
        /// Accessible only within the declaring class.
        const PRIVATE = 0x0002;
        /// Accessible within the package and subclasses.
        const PROTECTED = 0x0004;
        /// Class-level method, no receiver.
        const STATIC = 0x0008;
        /// Not overridable.
        const FINAL = 0x0010;
        /// Monitor-wrapped invocation.
        const SYNCHRONIZED = 0x0020;
        /// Compiler-generated bridge.
        const BRIDGE = 0x0040;
        /// Declared with variable arity.
        const VARARGS = 0x0080;
        /// Implemented natively.
        const NATIVE = 0x0100;
        /// No implementation in this class.
        const ABSTRACT = 0x0400;
        /// Compiler-synthesized.
        const SYNTHETIC = 0x1000;
        /// Instance or class initializer (dex-specific flag).
        const CONSTRUCTOR = 0x1_0000;
    }
}

/// How a call site dispatches to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum InvokeKind {
    /// Virtual dispatch on the receiver's class.
    Virtual,
    /// Interface dispatch.
    Interface,
    /// Non-virtual dispatch: constructors and private methods.
    Direct,
    /// Static dispatch, no receiver.
    Static,
    /// Non-virtual dispatch to the superclass implementation.
    Super,
}

impl InvokeKind {
    /// Returns `true` for kinds that pass a receiver as the first argument.
    #[must_use]
    pub fn has_receiver(self) -> bool {
        !matches!(self, InvokeKind::Static)
    }
}

/// Fact recorded for a method that is safe to consume from the class inliner.
///
/// Presence of this record means the method never leaks its receiver through
/// a field of another class, an argument position, or a thrown value. The
/// only possibly remaining exposure is the return value, flagged separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassInlinerEligibility {
    /// The method returns its receiver.
    ///
    /// Such a method is still eligible at call sites where the returned value
    /// is unused.
    pub returns_receiver: bool,
}

/// What a method does with one of its parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterUsage {
    /// The parameter has no uses at all.
    NotUsed,
    /// The parameter is used exactly once, as the receiver of one call.
    SingleCallOnReceiver {
        /// The invoked method.
        method: MethodRef,
        /// The dispatch kind of that call.
        kind: InvokeKind,
    },
    /// Any other usage pattern.
    Unknown,
}

/// Monotonically refined per-method facts.
///
/// Every field is a lattice with absence as top (least informative). Analyses
/// refine by join only; a populated fact is never replaced with a weaker one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptimizationInfo {
    /// Class-inliner eligibility of this method, when it has been analyzed
    /// and found not to leak its receiver.
    pub class_inliner_eligibility: Option<ClassInlinerEligibility>,

    /// Per-parameter usage facts, indexed by parameter position (receiver
    /// excluded).
    pub parameter_usages: Option<Vec<ParameterUsage>>,

    /// For a class initializer: the static final field it trivially
    /// initializes with an instance of the enclosing class.
    pub trivial_class_initializer: Option<FieldRef>,

    /// For an instance initializer: the body only forwards to the superclass
    /// constructor and stores arguments or constants into own fields.
    pub trivial_instance_initializer: bool,
}

impl OptimizationInfo {
    /// Refines the class-inliner eligibility fact.
    ///
    /// Joining an already-populated fact keeps the existing value; facts are
    /// never weakened.
    pub fn refine_class_inliner_eligibility(&mut self, eligibility: ClassInlinerEligibility) {
        if self.class_inliner_eligibility.is_none() {
            self.class_inliner_eligibility = Some(eligibility);
        }
    }

    /// Refines the parameter-usage facts.
    pub fn refine_parameter_usages(&mut self, usages: Vec<ParameterUsage>) {
        if self.parameter_usages.is_none() {
            self.parameter_usages = Some(usages);
        }
    }

    /// Refines the trivial class initializer fact.
    pub fn refine_trivial_class_initializer(&mut self, field: FieldRef) {
        if self.trivial_class_initializer.is_none() {
            self.trivial_class_initializer = Some(field);
        }
    }

    /// Marks the method as a trivial instance initializer.
    pub fn refine_trivial_instance_initializer(&mut self) {
        self.trivial_instance_initializer = true;
    }

    /// Returns the usage fact for one parameter, absence meaning unknown.
    #[must_use]
    pub fn parameter_usage(&self, index: usize) -> ParameterUsage {
        self.parameter_usages
            .as_ref()
            .and_then(|usages| usages.get(index).cloned())
            .unwrap_or(ParameterUsage::Unknown)
    }
}

/// A method definition: reference, flags, optional SSA body, and facts.
#[derive(Debug, Clone)]
pub struct MethodDefinition {
    /// The interned reference identifying this method.
    pub reference: MethodRef,
    /// Access flags.
    pub access_flags: MethodAccessFlags,
    /// SSA body; absent for abstract and native methods.
    pub code: Option<IrCode>,
    /// Generic signature attribute, passed through to the writer.
    pub generic_signature: Option<String>,
    /// Per-parameter annotation descriptor lists.
    pub parameter_annotations: Vec<Vec<String>>,
    /// Monotonically refined optimization facts.
    pub optimization_info: OptimizationInfo,
}

impl MethodDefinition {
    /// Creates a new method definition without a body.
    #[must_use]
    pub fn new(reference: MethodRef, access_flags: MethodAccessFlags) -> Self {
        Self {
            reference,
            access_flags,
            code: None,
            generic_signature: None,
            parameter_annotations: Vec::new(),
            optimization_info: OptimizationInfo::default(),
        }
    }

    /// Attaches an SSA body.
    #[must_use]
    pub fn with_code(mut self, code: IrCode) -> Self {
        self.code = Some(code);
        self
    }

    /// Returns `true` for class-level methods.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::STATIC)
    }

    /// Returns `true` for private methods.
    #[must_use]
    pub fn is_private(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::PRIVATE)
    }

    /// Returns `true` for instance and class initializers.
    #[must_use]
    pub fn is_initializer(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::CONSTRUCTOR)
    }

    /// Returns `true` for abstract methods.
    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::ABSTRACT)
    }

    /// Returns `true` for methods that take part in virtual dispatch.
    #[must_use]
    pub fn is_virtual(&self) -> bool {
        !self.is_static() && !self.is_private() && !self.is_initializer()
    }

    /// Returns the estimated instruction count when inlined.
    #[must_use]
    pub fn estimated_inline_size(&self) -> usize {
        self.code
            .as_ref()
            .map_or(usize::MAX, IrCode::total_instruction_count)
    }
}
