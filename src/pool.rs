//! Worker pool for tier-1 block coding and pooled scratch buffers.
//!
//! Blocks are independent, so they can be coded on a rayon pool when the
//! `parallel` feature is on. Jobs are indexed at submission and results
//! collected in submission order, which keeps the output byte stream
//! identical for any worker count. Scratch buffers recycle through a
//! per-thread pool in three size classes; anything larger is returned to
//! the allocator.

use std::cell::RefCell;

/// Run `job` over `items`, returning results in input order.
pub fn run_indexed<T, R, F>(items: Vec<T>, job: F) -> Vec<R>
where
    T: Send,
    R: Send,
    F: Fn(T) -> R + Sync + Send,
{
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        items.into_par_iter().map(job).collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        items.into_iter().map(job).collect()
    }
}

/// Size classes in bytes; buffers above the top class are not recycled.
const CLASSES: [usize; 3] = [1 << 10, 1 << 14, 1 << 18];

fn class_for(bytes: usize) -> Option<usize> {
    CLASSES.iter().position(|&cap| bytes <= cap)
}

macro_rules! scratch_pool {
    ($fn_name:ident, $pool:ident, $ty:ty) => {
        thread_local! {
            static $pool: RefCell<[Vec<Vec<$ty>>; 3]> =
                RefCell::new([Vec::new(), Vec::new(), Vec::new()]);
        }

        /// Borrow a cleared scratch vector with capacity for at least
        /// `len` elements from the thread's pool, recycling it afterwards
        /// when it fits a size class.
        pub fn $fn_name<R>(len: usize, f: impl FnOnce(&mut Vec<$ty>) -> R) -> R {
            let elem = std::mem::size_of::<$ty>();
            let mut buffer = match class_for(len * elem) {
                Some(class) => $pool.with(|pool| {
                    pool.borrow_mut()[class]
                        .pop()
                        .unwrap_or_else(|| Vec::with_capacity(CLASSES[class] / elem))
                }),
                None => Vec::with_capacity(len),
            };
            buffer.clear();
            let result = f(&mut buffer);
            if let Some(class) = class_for(buffer.capacity() * elem) {
                $pool.with(|pool| pool.borrow_mut()[class].push(buffer));
            }
            result
        }
    };
}

scratch_pool!(with_scratch_i32, I32_POOL, i32);
scratch_pool!(with_scratch_f64, F64_POOL, f64);
