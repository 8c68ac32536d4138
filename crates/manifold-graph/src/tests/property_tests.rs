//! Property-based tests for module identifiers and graph ordering.

use proptest::prelude::*;

use crate::{Module, ModuleGraph, ModuleId, SourceType};

fn segment() -> impl Strategy<Value = String> {
    "[a-z]{1,8}"
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Spelling a path with `./` and `x/..` detours yields the same id.
    #[test]
    fn prop_module_id_normalization(parts in prop::collection::vec(segment(), 1..=5), detour in segment()) {
        let plain = format!("{}.js", parts.join("/"));
        let noisy = format!("./{detour}/../{plain}");

        let a = ModuleId::new(&plain).unwrap();
        let b = ModuleId::new(&noisy).unwrap();
        prop_assert_eq!(a, b);
    }

    /// In an acyclic chain, every module comes after the module it imports.
    #[test]
    fn prop_execution_order_is_dependencies_first(len in 1usize..12) {
        let ids: Vec<ModuleId> = (0..len)
            .map(|i| ModuleId::new(format!("m{i}.js")).unwrap())
            .collect();

        let modules = ids.iter().enumerate().map(|(i, id)| {
            let code = if i + 1 < len {
                format!("import './m{}.js';\n", i + 1)
            } else {
                String::new()
            };
            let mut module = Module::from_source(id.clone(), SourceType::JavaScript, code);
            if i + 1 < len {
                module.resolve_import(&format!("./m{}.js", i + 1), Some(ids[i + 1].clone()));
            }
            module
        });

        let graph = ModuleGraph::from_modules(modules).with_entries([ids[0].clone()]);
        let order = graph.execution_order();

        prop_assert_eq!(order.len(), len);
        let mut expected = ids.clone();
        expected.reverse();
        prop_assert_eq!(order, expected);
        prop_assert!(graph.cycles().is_empty());
    }
}
