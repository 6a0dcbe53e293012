//! Proto normalization.
//!
//! Canonicalizes method parameter orderings so structurally equal parameter
//! lists become literally equal, letting the writer share proto entries. A
//! global reservation pass first computes the signatures that must remain
//! as-is (pinned methods, initializers, anything taking part in virtual
//! dispatch); the remaining methods are rewritten against one shared
//! reservation state, processed in deterministic class order.
//!
//! The emitted lens carries an argument permutation per rewritten method; the
//! application rewriter permutes call-site arguments and the definition's own
//! argument instructions.

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    graph::{GraphLens, PrototypeChanges},
    metadata::{DexApplication, MethodSignature, SymbolInterner, Type},
    shaking::KeepOracle,
    Result,
};

/// The proto normalization pass.
pub struct ProtoNormalizer {
    interner: Arc<SymbolInterner>,
    oracle: Arc<KeepOracle>,
}

/// One shared reservation state for the whole program.
///
/// Seeded per holder with every existing signature; each assignment reserves
/// the new signature so later methods cannot collide with it.
#[derive(Debug, Default)]
struct ReservationState {
    reserved: FxHashMap<Type, FxHashSet<MethodSignature>>,
}

impl ReservationState {
    fn seed(&mut self, app: &DexApplication, interner: &SymbolInterner) {
        for class in app.program_classes() {
            let entry = self.reserved.entry(class.ty).or_default();
            for method in class.methods() {
                entry.insert(interner.method_data(method.reference).signature());
            }
        }
    }

    /// Reserves `signature` on `holder` unless already taken.
    fn try_reserve(&mut self, holder: Type, signature: MethodSignature) -> bool {
        self.reserved.entry(holder).or_default().insert(signature)
    }
}

impl ProtoNormalizer {
    /// Creates the pass.
    #[must_use]
    pub fn new(interner: Arc<SymbolInterner>, oracle: Arc<KeepOracle>) -> Self {
        Self { interner, oracle }
    }

    /// Runs the pass; returns the lens, or `None` when nothing changed.
    ///
    /// # Errors
    ///
    /// Only lens construction can fail.
    pub fn run(&self, app: &DexApplication) -> Result<Option<GraphLens>> {
        let interner = &self.interner;
        let mut state = ReservationState::default();
        state.seed(app, interner);

        let mut builder = GraphLens::builder("proto normalization");
        let mut changed = false;

        for class in app.classes_with_deterministic_order() {
            for method in class.methods() {
                let data = interner.method_data(method.reference);

                // Unoptimizable signatures stay as-is: anything pinned,
                // initializers, and every method taking part in virtual
                // dispatch. Only static methods are free to permute.
                if !method.is_static()
                    || data.is_class_initializer()
                    || method.is_abstract()
                    || self.oracle.is_pinned_method(method.reference, interner)
                {
                    continue;
                }
                if data.params.len() < 2 {
                    continue;
                }

                let permutation = sorted_permutation(&data.params, interner);
                let already_sorted = permutation
                    .iter()
                    .enumerate()
                    .all(|(position, &old)| old as usize == position);
                if already_sorted {
                    continue;
                }

                let new_params: Vec<Type> = permutation
                    .iter()
                    .map(|&old| data.params[old as usize])
                    .collect();
                let new_signature = MethodSignature {
                    name: data.name.clone(),
                    params: Arc::from(new_params.as_slice()),
                    return_type: data.return_type,
                };
                if !state.try_reserve(data.holder, new_signature) {
                    // The canonical form collides with a reserved signature;
                    // the method keeps its original proto.
                    continue;
                }

                let target =
                    interner.method(data.holder, &data.name, &new_params, data.return_type);
                builder.move_method_with_prototype(
                    method.reference,
                    target,
                    PrototypeChanges::none().with_argument_permutation(permutation),
                );
                changed = true;
            }
        }

        if !changed {
            return Ok(None);
        }
        Ok(Some(builder.build(interner)?))
    }
}

/// Computes the stable permutation sorting parameters by descriptor:
/// `result[i]` is the old index of the parameter placed at position `i`.
fn sorted_permutation(params: &[Type], interner: &SymbolInterner) -> Vec<u16> {
    let mut order: Vec<u16> = (0..params.len() as u16).collect();
    order.sort_by(|&a, &b| {
        interner.compare_types(params[a as usize], params[b as usize])
    });
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::IrBuilder,
        metadata::{MethodAccessFlags, MethodDefinition},
        shaking::KeepRules,
        testutil::TestProgramBuilder,
    };

    fn add_static_method(
        builder: &mut TestProgramBuilder,
        holder: Type,
        name: &str,
        params: &[Type],
    ) -> crate::metadata::MethodRef {
        let interner = builder.interner();
        let reference = interner.method(holder, name, params, Type::VOID);
        let mut body = IrBuilder::new();
        for &param in params {
            let _ = body.argument(param);
        }
        body.ret(None);
        builder.class_mut(holder).unwrap().add_method(
            MethodDefinition::new(
                reference,
                MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
            )
            .with_code(body.finish()),
        );
        reference
    }

    #[test]
    fn test_parameters_sort_by_descriptor() {
        let mut builder = TestProgramBuilder::new();
        let interner = builder.interner();
        let c = builder.simple_class("LC;");
        let method = add_static_method(&mut builder, c, "m", &[Type::STRING, Type::INT]);
        let (app, _) = builder.build();

        let oracle = Arc::new(KeepOracle::new(Arc::new(KeepRules::new())));
        let normalizer = ProtoNormalizer::new(interner.clone(), oracle);
        let lens = normalizer.run(&app).unwrap().unwrap();

        let (mapped, changes) = lens.map_method(method, &interner);
        let data = interner.method_data(mapped);
        // "I" sorts before "Ljava/lang/String;".
        assert_eq!(data.params.as_ref(), &[Type::INT, Type::STRING]);
        assert_eq!(changes.argument_permutation(), Some(&[1u16, 0][..]));
    }

    #[test]
    fn test_collision_keeps_original_proto() {
        let mut builder = TestProgramBuilder::new();
        let interner = builder.interner();
        let c = builder.simple_class("LC;");
        // The canonical form of m(String, int) is m(int, String), which is
        // already declared; the method keeps its proto.
        add_static_method(&mut builder, c, "m", &[Type::INT, Type::STRING]);
        let shadowed = add_static_method(&mut builder, c, "m", &[Type::STRING, Type::INT]);
        let (app, _) = builder.build();

        let oracle = Arc::new(KeepOracle::new(Arc::new(KeepRules::new())));
        let normalizer = ProtoNormalizer::new(interner.clone(), oracle);
        let lens = normalizer.run(&app).unwrap();

        if let Some(lens) = lens {
            let (mapped, _) = lens.map_method(shadowed, &interner);
            assert_eq!(mapped, shadowed);
        }
    }

    #[test]
    fn test_virtual_methods_keep_their_proto() {
        let mut builder = TestProgramBuilder::new();
        let interner = builder.interner();
        let c = builder.simple_class("LC;");
        let reference = interner.method(c, "m", &[Type::STRING, Type::INT], Type::VOID);
        let mut body = IrBuilder::new();
        let _ = body.argument(c);
        let _ = body.argument(Type::STRING);
        let _ = body.argument(Type::INT);
        body.ret(None);
        builder.class_mut(c).unwrap().add_method(
            MethodDefinition::new(reference, MethodAccessFlags::PUBLIC).with_code(body.finish()),
        );
        let (app, _) = builder.build();

        let oracle = Arc::new(KeepOracle::new(Arc::new(KeepRules::new())));
        let normalizer = ProtoNormalizer::new(interner, oracle);
        assert!(normalizer.run(&app).unwrap().is_none());
    }
}
