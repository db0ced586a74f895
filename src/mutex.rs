//! A common Mutex interface for the interrupt-masked critical sections in
//! spec §5: SD command issuance, FAT window reload, and `WriteBuffer::flush`
//! all run inside one of these.
//!
//! Nothing here implements poisoning! If you panic while having locked one of
//! these mutexes, no guarantees about what happens next!
//!
//! (We are okay with this because, as configured, we can't recover from panics
//! on embedded anyways — our panic handler just spins forever.)

pub trait MutexInterface<T>: Sync {
    fn new(inner: T) -> Self;

    /// Run a function in a critical section.
    fn cs<F: FnOnce(&mut T) -> R, R>(&self, func: F) -> R;

    /// Get mutable access to the inner data *using a mutable reference*.
    /// Since Rust can statically prove that we have exclusive access in this
    /// case, no locking occurs.
    fn get_mut(&mut self) -> &mut T;
}

#[cfg(not(feature = "no_std"))]
pub mod from_std {
    use super::MutexInterface;

    pub use std::sync::Mutex;

    impl<T: Send> MutexInterface<T> for Mutex<T> {
        fn new(inner: T) -> Self {
            Mutex::new(inner)
        }

        #[inline]
        fn cs<F: FnOnce(&mut T) -> R, R>(&self, func: F) -> R {
            let mut inner = self.lock().unwrap();

            func(&mut *inner)
        }

        #[inline]
        fn get_mut(&mut self) -> &mut T {
            self.get_mut().unwrap()
        }
    }
}

// Unfortunately, users on non-cortex-M ARM targets will get a cryptic error
// about the cortex_m crate not having certain functions if they try to build
// with this feature combination; there's no FFI escape hatch in this crate
// since we have no bindings surface for a caller to plug one in through.
#[cfg(target_arch = "arm")]
pub mod bare_metal {
    use super::MutexInterface;

    use core::cell::Cell;

    use bare_metal::CriticalSection;
    use cortex_m::interrupt;

    // Unfortunately, the `bare_metal::Mutex` does not provide us with a
    // mutable reference to the type it wraps, so we basically go and
    // reconstruct it here.
    pub struct Mutex<T> {
        inner: Cell<T>,
    }

    impl<T> Mutex<T> {
        /// Borrows the data for the duration of the critical section.
        #[inline]
        pub fn borrow<'cs>(&'cs self, _cs: &'cs CriticalSection) -> &'cs mut T {
            unsafe { &mut *self.inner.as_ptr() }
        }
    }

    impl<T: Send> MutexInterface<T> for Mutex<T> {
        fn new(value: T) -> Self {
            Mutex {
                inner: Cell::new(value),
            }
        }

        #[inline]
        fn cs<F: FnOnce(&mut T) -> R, R>(&self, func: F) -> R {
            interrupt::free(|cs| func(self.borrow(cs)))
        }

        #[inline]
        fn get_mut(&mut self) -> &mut T {
            self.inner.get_mut()
        }
    }

    // As with the actual `bare_metal::Mutex`:
    unsafe impl<T> Sync for Mutex<T> where T: Send {}
}

cfg_if::cfg_if! {
    if #[cfg(all(target_arch = "arm", feature = "no_std"))] {
        pub use bare_metal::Mutex;
    } else if #[cfg(not(feature = "no_std"))] {
        pub use from_std::Mutex;
    } else {
        compile_error!("no_std builds need a `target_arch = \"arm\"` Mutex backend");
    }
}
