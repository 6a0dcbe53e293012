//! The whole-program driver.
//!
//! Sequences the passes in their fixed order, rebuilds the application view
//! after each lens-producing pass, and dispatches per-method work onto a
//! worker pool:
//!
//! 1. Initial tree shaking (mark live symbols)
//! 2. Vertical class merging (lens)
//! 3. Horizontal class merging (lens)
//! 4. Enum unboxing (lens with prototype changes)
//! 5. Proto normalization (lens with prototype changes)
//! 6. Per-method IR optimizations, including the class inliner, followed by a
//!    final shaking round
//! 7. Minification (lens)
//! 8. Writer handoff: the finalized application plus the residual rename map
//!
//! After each lens-producing pass the driver atomically rewrites the
//! application with the new lens and pushes it onto the stack; caches keyed
//! on pre-rename references are not carried across that boundary. Fatal
//! diagnostics abort at the next pass boundary with no output.

pub mod config;
pub(crate) mod rewriter;

use std::sync::Arc;

use dashmap::DashMap;
use rayon::prelude::*;
use rustc_hash::FxHashSet;

use crate::{
    analysis::SummaryAnalysis,
    diagnostics::{DiagnosticCategory, Diagnostics},
    inliner::ClassInliner,
    ir::IrCode,
    merging::{HorizontalClassMerger, VerticalClassMerger},
    metadata::{
        AppView, ClassHierarchy, DexApplication, MethodRef, SymbolInterner, Type,
    },
    naming::{Minifier, OriginalProgram, RenameMapping},
    optimize::{EnumUnboxer, ProtoNormalizer},
    shaking::{Enqueuer, KeepConstraints, KeepOracle, KeepRules, LiveSet, ShakeResult},
    Result,
};

pub use config::CompilerOptions;

/// The result handed to the writer collaborator.
#[derive(Debug)]
pub struct CompilationResult {
    /// The final application view.
    pub application: DexApplication,
    /// The residual rename map (composition of every lens still in effect).
    pub mapping: RenameMapping,
    /// Every diagnostic collected during the run.
    pub diagnostics: Arc<Diagnostics>,
}

/// The whole-program compilation driver.
pub struct Driver {
    options: CompilerOptions,
}

impl Driver {
    /// Creates a driver with the given options.
    #[must_use]
    pub fn new(options: CompilerOptions) -> Self {
        Self { options }
    }

    /// Runs the full pipeline over one application.
    ///
    /// # Errors
    ///
    /// Returns an error on rule conflicts, fatal diagnostics (unresolved
    /// references without `dontWarn`), internal invariant violations, and
    /// post-optimization format limits. On error no output is produced.
    pub fn run(&self, app: DexApplication, rules: KeepRules) -> Result<CompilationResult> {
        let interner = app.interner();
        let diagnostics = Arc::new(Diagnostics::new());
        let oracle = Arc::new(KeepOracle::new(Arc::new(rules)));

        if let Err(error) = oracle.check_conflicts(&app, &interner) {
            diagnostics.error(DiagnosticCategory::Rules, error.to_string());
            return Err(error);
        }

        let original = OriginalProgram::snapshot(&app);
        let mut view = AppView::new(app);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.threads)
            .build()
            .map_err(|error| {
                crate::Error::Error(format!("failed to build worker pool: {error}"))
            })?;

        // 1. Initial tree shaking.
        let shake = self.shake(&view.app, &interner, &oracle, &diagnostics);
        self.check_fatal(&diagnostics)?;
        retain_live(&mut view.app, &shake.live, &oracle, &interner);

        // 2. Vertical class merging.
        let mut vertically_merged: FxHashSet<Type> = FxHashSet::default();
        if self.options.enable_vertical_class_merging {
            let merger = VerticalClassMerger::new(interner.clone(), oracle.clone());
            let (lens, merged) =
                merger.run(&mut view.app, &shake.live, &shake.runtime_checks)?;
            vertically_merged = merged;
            if let Some(lens) = lens {
                rewriter::apply_lens(&mut view.app, &lens, &interner);
                view.push_lens(lens)?;
            }
        }

        // 3. Horizontal class merging.
        if self.options.enable_horizontal_class_merging {
            let main_dex: FxHashSet<Type> = self
                .options
                .main_dex_descriptors
                .iter()
                .map(|descriptor| interner.type_of(descriptor))
                .collect();
            let merger = HorizontalClassMerger::new(
                interner.clone(),
                oracle.clone(),
                shake.runtime_checks.clone(),
                vertically_merged,
                main_dex,
            );
            if let Some(lens) = merger.run(&mut view.app)? {
                rewriter::apply_lens(&mut view.app, &lens, &interner);
                view.push_lens(lens)?;
            }
        }

        // 4. Enum unboxing.
        if self.options.enable_enum_unboxing {
            let unboxer = EnumUnboxer::new(interner.clone(), oracle.clone());
            if let Some(lens) = unboxer.run(&mut view.app, &shake.runtime_checks)? {
                rewriter::apply_lens(&mut view.app, &lens, &interner);
                view.push_lens(lens)?;
            }
        }

        // 5. Proto normalization.
        if self.options.enable_proto_normalization {
            let normalizer = ProtoNormalizer::new(interner.clone(), oracle.clone());
            if let Some(lens) = normalizer.run(&view.app)? {
                rewriter::apply_lens(&mut view.app, &lens, &interner);
                view.push_lens(lens)?;
            }
        }

        // 6. Per-method IR optimizations on the worker pool.
        self.run_ir_phase(&pool, &mut view, &interner, &oracle, &diagnostics)?;
        self.check_fatal(&diagnostics)?;

        // Final shaking round: classes emptied by inlining disappear here.
        let shake = self.shake(&view.app, &interner, &oracle, &diagnostics);
        self.check_fatal(&diagnostics)?;
        retain_live(&mut view.app, &shake.live, &oracle, &interner);
        sweep_memberless_classes(&mut view.app, &oracle, &interner);

        // 7. Minification.
        if self.options.minification {
            let minifier = Minifier::new(interner.clone(), oracle.clone());
            if let Some(lens) = minifier.run(&view.app)? {
                rewriter::apply_lens(&mut view.app, &lens, &interner);
                view.push_lens(lens)?;
            }
        }

        // 8. Writer handoff.
        let method_count = view.app.program_method_count();
        if method_count > self.options.max_methods_per_partition {
            let error = crate::Error::FormatLimit(format!(
                "{method_count} methods exceed the partition limit of {}",
                self.options.max_methods_per_partition
            ));
            diagnostics.error(DiagnosticCategory::Format, error.to_string());
            return Err(error);
        }

        let mapping = RenameMapping::build(&original, view.lens(), &interner);
        let (application, _) = view.into_parts();
        Ok(CompilationResult {
            application,
            mapping,
            diagnostics,
        })
    }

    fn shake(
        &self,
        app: &DexApplication,
        interner: &SymbolInterner,
        oracle: &KeepOracle,
        diagnostics: &Diagnostics,
    ) -> ShakeResult {
        let hierarchy = ClassHierarchy::build(app, interner);
        Enqueuer::new(app, interner, &hierarchy, oracle, diagnostics).run()
    }

    fn check_fatal(&self, diagnostics: &Diagnostics) -> Result<()> {
        if diagnostics.has_errors() {
            return Err(crate::Error::Error(format!(
                "compilation aborted after {} error(s)",
                diagnostics.error_count()
            )));
        }
        Ok(())
    }

    /// Step 6: summaries, then one work item per method through the class
    /// inliner and local cleanup.
    fn run_ir_phase(
        &self,
        pool: &rayon::ThreadPool,
        view: &mut AppView,
        interner: &Arc<SymbolInterner>,
        oracle: &Arc<KeepOracle>,
        diagnostics: &Diagnostics,
    ) -> Result<()> {
        pool.install(|| SummaryAnalysis::run(&mut view.app, interner));

        // Callee lookups during inlining read this immutable pre-phase
        // snapshot; workers therefore always observe the pre-pass body of a
        // method processed concurrently.
        let mut snapshot: rustc_hash::FxHashMap<MethodRef, IrCode> =
            rustc_hash::FxHashMap::default();
        // Each worker owns exactly one method's body at a time through the
        // shared code table.
        let codes: DashMap<MethodRef, IrCode> = DashMap::new();
        let mut work: Vec<MethodRef> = Vec::new();
        for class in view.app.program_classes_mut() {
            for method in class.methods_mut() {
                if let Some(code) = method.code.take() {
                    snapshot.insert(method.reference, code.clone());
                    codes.insert(method.reference, code);
                    work.push(method.reference);
                }
            }
        }
        work.sort_unstable();

        let inliner = ClassInliner::new(self.options.class_inliner_instruction_limit);
        let app = &view.app;
        let snapshot = &snapshot;
        let enable_class_inlining = self.options.enable_class_inlining;
        let outcome: Result<()> = pool.install(|| {
            work.par_iter().try_for_each(|&method| -> Result<()> {
                let Some((_, mut code)) = codes.remove(&method) else {
                    return Ok(());
                };
                if enable_class_inlining {
                    inliner.process_method(method, &mut code, app, interner, oracle, snapshot)?;
                }
                code.remove_unreachable_blocks();
                code.eliminate_dead_code();
                code.remove_trivial_phis();
                codes.insert(method, code);
                Ok(())
            })
        });

        // Bodies flow back even on failure so the application stays coherent
        // for diagnostics. A method with zero basic blocks is removed
        // outright.
        for class in view.app.program_classes_mut() {
            class.methods_mut().retain_mut(|method| {
                if let Some((_, code)) = codes.remove(&method.reference) {
                    if code.is_empty() {
                        return false;
                    }
                    method.code = Some(code);
                }
                true
            });
        }

        outcome.map_err(|error| {
            diagnostics.error(DiagnosticCategory::Ir, error.to_string());
            error
        })
    }
}

/// Drops everything the shake did not mark, keeping rule-rooted symbols.
fn retain_live(
    app: &mut DexApplication,
    live: &LiveSet,
    oracle: &KeepOracle,
    interner: &SymbolInterner,
) {
    app.retain_program_classes(|class| {
        live.is_live_class(class.ty)
            || oracle
                .class_constraints(class.ty, interner)
                .contains(KeepConstraints::PRESENCE)
    });
    for class in app.program_classes_mut() {
        class.methods_mut().retain(|method| {
            live.is_live_method(method.reference)
                || oracle
                    .method_constraints(method.reference, interner)
                    .contains(KeepConstraints::PRESENCE)
        });
        class.fields_mut().retain(|field| {
            live.is_live_field(field.reference)
                || oracle
                    .field_constraints(field.reference, interner)
                    .contains(KeepConstraints::PRESENCE)
        });
    }
}

/// Boundary behavior: a class with no remaining members is removed outright
/// unless pinned.
fn sweep_memberless_classes(
    app: &mut DexApplication,
    oracle: &KeepOracle,
    interner: &SymbolInterner,
) {
    app.retain_program_classes(|class| {
        !class.is_memberless() || oracle.is_pinned_class(class.ty, interner)
    });
}
