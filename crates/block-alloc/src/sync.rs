//! Synchronization primitives used by the crate.
//!
//! Under `cfg(loom)` everything resolves to `loom`'s model-checked types so
//! the model can explore every interleaving. Every module must import atomics
//! and locks from here; a direct `core::sync::atomic` import would bypass the
//! loom scheduler.

cfg_if::cfg_if! {
    if #[cfg(loom)] {
        pub(crate) mod atomic {
            pub(crate) use loom::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
            #[cfg(feature = "hardened")]
            pub(crate) use loom::sync::atomic::AtomicU8;
        }

        pub(crate) use loom::hint::spin_loop;

        pub(crate) type MutexGuard<'a, T> = loom::sync::MutexGuard<'a, T>;

        pub(crate) struct Mutex<T>(loom::sync::Mutex<T>);

        impl<T> Mutex<T> {
            pub(crate) fn new(data: T) -> Self {
                Self(loom::sync::Mutex::new(data))
            }

            pub(crate) fn lock(&self) -> MutexGuard<'_, T> {
                self.0
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
            }
        }
    } else {
        pub(crate) mod atomic {
            pub(crate) use core::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
            #[cfg(feature = "hardened")]
            pub(crate) use core::sync::atomic::AtomicU8;
        }

        pub(crate) use core::hint::spin_loop;

        // Waiters yield to the OS scheduler when threads outnumber cores.
        #[cfg(feature = "std")]
        type Relax = spin::relax::Yield;
        #[cfg(not(feature = "std"))]
        type Relax = spin::relax::Spin;

        pub(crate) type MutexGuard<'a, T> = spin::mutex::SpinMutexGuard<'a, T>;

        pub(crate) struct Mutex<T>(spin::mutex::SpinMutex<T, Relax>);

        impl<T> Mutex<T> {
            pub(crate) const fn new(data: T) -> Self {
                Self(spin::mutex::SpinMutex::new(data))
            }

            pub(crate) fn lock(&self) -> MutexGuard<'_, T> {
                self.0.lock()
            }
        }
    }
}
