// OmniHost Extension API
// Capability traits, constructor tables and the native registration ABI
// shared by the host and the extensions it loads.

pub mod extension;
pub mod factory;
pub mod isolation;
pub mod value;

pub use extension::{
    Extension, ExtensionState, ExtensionStatistics, GracefulShutdown, RequestCounters,
};
pub use factory::{
    ConstructionContext, ConstructorFn, ConstructorSignature, ExtensionFactory, FactoryTable,
};
pub use isolation::IsolationContext;
pub use value::{DependencyValue, ObjectValue, ParamType};

// Re-export core types that extensions interact with
pub use omnihost_core::types::ExtensionDescriptor;

/// Extension ABI version; bumped whenever the trait objects above change shape
pub const EXTENSION_ABI_VERSION: u32 = 1;

/// Symbol a native artifact exports to register its factories
pub const REGISTER_SYMBOL: &[u8] = b"omnihost_register_extensions";

/// Symbol a native artifact exports to report its ABI version
pub const ABI_VERSION_SYMBOL: &[u8] = b"omnihost_extension_abi_version";

/// Signature of [`REGISTER_SYMBOL`]. Host and artifact must be built with the
/// same compiler since the table crosses the boundary as a Rust reference.
pub type RegisterExtensionsFn = unsafe fn(&FactoryTable);

/// Signature of [`ABI_VERSION_SYMBOL`].
pub type AbiVersionFn = unsafe fn() -> u32;

/// Exports the registration symbols from an extension `cdylib`.
///
/// ```rust,ignore
/// omnihost_extension_api::export_extensions!(
///     ExtensionFactory::new("echo").constructor(vec![], |ctx, _| Ok(Echo::new(ctx)))
/// );
/// ```
#[macro_export]
macro_rules! export_extensions {
    ($($factory:expr),* $(,)?) => {
        #[no_mangle]
        pub fn omnihost_extension_abi_version() -> u32 {
            $crate::EXTENSION_ABI_VERSION
        }

        #[no_mangle]
        pub fn omnihost_register_extensions(table: &$crate::FactoryTable) {
            $( table.register($factory); )*
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_names_match_macro() {
        assert_eq!(REGISTER_SYMBOL, b"omnihost_register_extensions");
        assert_eq!(ABI_VERSION_SYMBOL, b"omnihost_extension_abi_version");
        assert_eq!(EXTENSION_ABI_VERSION, 1);
    }
}
