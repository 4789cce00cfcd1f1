/// Defines a wrapper type for an actor.
///
/// The state type is defined separately and must implement
/// [`ActorState`](crate::ActorState). The wrapper owns a strong handle to
/// the spawned actor and can later have `impl` blocks to add some
/// convenient methods to interact with it.
///
/// Extra fields can be attached to the wrapper. They are passed to
/// `spawn` in declaration order and cloned together with the handle.
///
/// ```ignore
/// define_actor! {
///     /// Docs for the wrapper.
///     pub actor Counter(CounterState) {
///         label: Arc<str>,
///     }
/// }
/// ```
#[macro_export]
macro_rules! define_actor {
    {
        $(#[$attrs:meta])*
        $v:vis actor $wrapper_type:ident($state_type:ty);
    } => {
        $crate::define_actor! {
            $(#[$attrs])*
            $v actor $wrapper_type($state_type) {}
        }
    };
    {
        $(#[$attrs:meta])*
        $v:vis actor $wrapper_type:ident($state_type:ty) {
            $($field:ident: $field_type:ty),* $(,)?
        }
    } => {
        $(#[$attrs])*
        $v struct $wrapper_type {
            handle: $crate::Actor<$state_type>,
            $($field: $field_type,)*
        }

        #[allow(dead_code)]
        impl $wrapper_type {
            #[inline]
            fn spawn(
                state: $state_type,
                label: Option<&str>,
                $($field: $field_type,)*
            ) -> $wrapper_type {
                let handle = $crate::Actor::spawn(state, label);
                $wrapper_type {
                    handle,
                    $($field,)*
                }
            }

            #[inline]
            fn handle(&self) -> &$crate::Actor<$state_type> {
                &self.handle
            }
        }

        impl Clone for $wrapper_type {
            fn clone(&self) -> Self {
                $wrapper_type {
                    handle: self.handle.clone(),
                    $($field: self.$field.clone(),)*
                }
            }
        }
    };
}
