/// Implements [`Component::core`](crate::core::components::Component::core) and
/// [`Component::core_mut`](crate::core::components::Component::core_mut) for a struct with a
/// `core: ComponentCore` field. Use inside the `impl Component` block.
///
/// # Example
/// ```rust
/// use hydrosim::component_core;
/// use hydrosim::core::components::{Component, ComponentCore, StepContext};
/// use hydrosim::core::error::ComponentError;
///
/// struct Doubler {
///     core: ComponentCore,
/// }
///
/// impl Component for Doubler {
///     component_core!();
///
///     fn step(&mut self, _ctx: &mut StepContext<'_>) -> Result<(), ComponentError> {
///         let x = self.core.input_f64_or("x", 0.0);
///         self.core.set_output("y", 2.0 * x);
///         Ok(())
///     }
/// }
/// ```
#[macro_export]
macro_rules! component_core {
    () => {
        $crate::component_core!(core);
    };
    ($field:ident) => {
        fn core(&self) -> &$crate::core::components::ComponentCore {
            &self.$field
        }

        fn core_mut(&mut self) -> &mut $crate::core::components::ComponentCore {
            &mut self.$field
        }
    };
}

/// Boxes a constructor result for a registry factory:
/// `boxed!(Reservoir::new(spec) => Component)` turns `Result<Reservoir, E>` into
/// `Result<Box<dyn Component>, E>`.
#[macro_export]
macro_rules! boxed {
    ($expr:expr => $trait:ident) => {
        $expr.map(|value| Box::new(value) as Box<dyn $trait>)
    };
}
