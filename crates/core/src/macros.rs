// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Declarative macros shared across the workspace.
//!
//! - [`simple_display!`] maps enum variants to their wire names
//! - [`builder!`] generates test builders for record types
//! - [`setters!`] generates optional-field setters on config structs

/// Implement `Display` by mapping each variant to a string literal.
///
/// Data-carrying variants ignore their fields with `(..)`. The strings
/// double as the human-readable wire names, so they should match the
/// variant's serde rename.
///
/// ```ignore
/// crate::simple_display! {
///     TaskState {
///         Pending => "pending",
///         Running => "running",
///     }
/// }
/// ```
#[macro_export]
macro_rules! simple_display {
    ($enum:ty { $( $variant:ident $(( $($ignore:tt)* ))? => $str:expr ),+ $(,)? }) => {
        impl std::fmt::Display for $enum {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                let name = match self {
                    $( Self::$variant $(( $($ignore)* ))? => $str, )+
                };
                f.write_str(name)
            }
        }
    };
}

/// Generate a test builder for a record type: the builder struct, a
/// `Default` seeded with the given values, one setter per field, a
/// `build()`, and a `Type::builder()` entry point. Everything is gated
/// behind `test-support` so production builds carry none of it.
///
/// Field groups:
/// - `into { field: Type = default }` — setter takes `impl Into<Type>`
/// - `set { field: Type = default }` — setter takes `Type` directly
/// - `option { field: Type = default }` — field is `Option<Type>`, setter
///   wraps its argument in `Some`
///
/// Every field of the target struct must appear in exactly one group.
///
/// ```ignore
/// crate::builder! {
///     pub struct TaskBuilder => TaskDefinition {
///         into { name: String = "docs.Count" }
///         set { state: TaskState = TaskState::Pending }
///         option { error: String = None }
///     }
/// }
/// ```
#[macro_export]
macro_rules! builder {
    (
        pub struct $builder:ident => $target:ident {
            $(into {
                $( $into_field:ident : $into_ty:ty = $into_default:expr ),* $(,)?
            })?
            $(set {
                $( $set_field:ident : $set_ty:ty = $set_default:expr ),* $(,)?
            })?
            $(option {
                $( $opt_field:ident : $opt_ty:ty = $opt_default:expr ),* $(,)?
            })?
        }
    ) => {
        #[cfg(any(test, feature = "test-support"))]
        pub struct $builder {
            $($( $into_field: $into_ty, )*)?
            $($( $set_field: $set_ty, )*)?
            $($( $opt_field: Option<$opt_ty>, )*)?
        }

        #[cfg(any(test, feature = "test-support"))]
        impl Default for $builder {
            fn default() -> Self {
                Self {
                    $($( $into_field: $into_default.into(), )*)?
                    $($( $set_field: $set_default, )*)?
                    $($( $opt_field: $opt_default, )*)?
                }
            }
        }

        #[cfg(any(test, feature = "test-support"))]
        impl $builder {
            $($(
                pub fn $into_field(mut self, v: impl Into<$into_ty>) -> Self {
                    self.$into_field = v.into();
                    self
                }
            )*)?

            $($(
                pub fn $set_field(mut self, v: $set_ty) -> Self {
                    self.$set_field = v;
                    self
                }
            )*)?

            $($(
                pub fn $opt_field(mut self, v: impl Into<$opt_ty>) -> Self {
                    self.$opt_field = Some(v.into());
                    self
                }
            )*)?

            pub fn build(self) -> $target {
                $target {
                    $($( $into_field: self.$into_field, )*)?
                    $($( $set_field: self.$set_field, )*)?
                    $($( $opt_field: self.$opt_field, )*)?
                }
            }
        }

        #[cfg(any(test, feature = "test-support"))]
        impl $target {
            /// Create a builder with test defaults.
            pub fn builder() -> $builder {
                $builder::default()
            }
        }
    };
}

/// Generate chained setters for the `Option` fields of a config struct,
/// inside an existing `impl` block. Each setter wraps its argument in
/// `Some`, so unset fields keep their `Default`.
///
/// ```ignore
/// impl ExecOptions {
///     af_core::setters! {
///         runner_id: RunnerId,
///         dispatcher: Arc<dyn InlineDispatcher>,
///     }
/// }
/// ```
#[macro_export]
macro_rules! setters {
    ( $( $field:ident : $ty:ty ),* $(,)? ) => {
        $(
            pub fn $field(mut self, v: impl Into<$ty>) -> Self {
                self.$field = Some(v.into());
                self
            }
        )*
    };
}
