//! Module `bell`
//!
//! A single-assignment future used for everything the channel resolves
//! asynchronously: command replies, authentication and feature queries.
//!
//! A `Bell` is rung exactly once with either a value or a `ChannelError`.
//! Interested parties can register a continuation with [`Bell::on_ring`],
//! block with [`Bell::wait`], forward the result into another bell with
//! [`Bell::promise`], or simply `.await` it.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::task::{Context, Poll, Waker};

use crate::error::ChannelError;
use crate::utils::sync::lock;

type Callback<T> = Box<dyn FnOnce(&Result<T, ChannelError>) + Send>;

struct State<T> {
    value: Option<Result<T, ChannelError>>,
    callbacks: Vec<Callback<T>>,
    wakers: Vec<Waker>,
}

struct Inner<T> {
    state: Mutex<State<T>>,
    rung: Condvar,
}

/// Single-assignment future. Clones share the same slot.
pub struct Bell<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Bell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + 'static> Default for Bell<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> Bell<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    value: None,
                    callbacks: Vec::new(),
                    wakers: Vec::new(),
                }),
                rung: Condvar::new(),
            }),
        }
    }

    /// Creates a bell that has already been rung.
    pub fn ready(value: Result<T, ChannelError>) -> Self {
        let bell = Self::new();
        bell.ring(value);
        bell
    }

    /// Resolves the bell. Returns false, leaving the bell untouched, if it
    /// had already been rung.
    pub fn ring(&self, value: Result<T, ChannelError>) -> bool {
        let (callbacks, wakers) = {
            let mut state = lock(&self.inner.state);
            if state.value.is_some() {
                return false;
            }
            state.value = Some(value.clone());
            (
                std::mem::take(&mut state.callbacks),
                std::mem::take(&mut state.wakers),
            )
        };

        self.inner.rung.notify_all();
        wakers.into_iter().for_each(Waker::wake);
        for callback in callbacks {
            callback(&value);
        }
        true
    }

    pub fn ring_ok(&self, value: T) -> bool {
        self.ring(Ok(value))
    }

    pub fn ring_err(&self, err: ChannelError) -> bool {
        self.ring(Err(err))
    }

    pub fn is_done(&self) -> bool {
        lock(&self.inner.state).value.is_some()
    }

    /// Returns a copy of the result if the bell has been rung.
    pub fn peek(&self) -> Option<Result<T, ChannelError>> {
        lock(&self.inner.state).value.clone()
    }

    /// Registers a continuation. It runs on the thread that rings the bell,
    /// or immediately on this thread if the bell has already been rung.
    pub fn on_ring<F>(&self, f: F)
    where
        F: FnOnce(&Result<T, ChannelError>) + Send + 'static,
    {
        let mut state = lock(&self.inner.state);
        match &state.value {
            Some(value) => {
                let value = value.clone();
                drop(state);
                f(&value);
            }
            None => state.callbacks.push(Box::new(f)),
        }
    }

    /// Blocks the current thread until the bell is rung.
    ///
    /// Must not be called from inside an async runtime worker or a command
    /// handler; `.await` the bell there instead.
    pub fn wait(&self) -> Result<T, ChannelError> {
        let mut state = lock(&self.inner.state);
        loop {
            if let Some(value) = &state.value {
                return value.clone();
            }
            state = self
                .inner
                .rung
                .wait(state)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
    }

    /// Rings `other` with this bell's result once it is known.
    pub fn promise(&self, other: &Bell<T>) {
        let other = other.clone();
        self.on_ring(move |value| {
            other.ring(value.clone());
        });
    }

    /// Returns a bell resolved with `f` applied to this bell's value.
    pub fn map<U, F>(&self, f: F) -> Bell<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Result<U, ChannelError> + Send + 'static,
    {
        let mapped = Bell::new();
        let out = mapped.clone();
        self.on_ring(move |value| {
            out.ring(value.clone().and_then(f));
        });
        mapped
    }
}

impl Bell<bool> {
    /// Resolves true as soon as any input resolves true, false once all have
    /// resolved false. The first error wins.
    pub fn any(bells: Vec<Bell<bool>>) -> Bell<bool> {
        Self::combine(bells, true)
    }

    /// Resolves false as soon as any input resolves false, true once all
    /// have resolved true. The first error wins.
    pub fn all(bells: Vec<Bell<bool>>) -> Bell<bool> {
        Self::combine(bells, false)
    }

    // `decisive` is the value that settles the result on its own.
    fn combine(bells: Vec<Bell<bool>>, decisive: bool) -> Bell<bool> {
        let out = Bell::new();
        if bells.is_empty() {
            out.ring_ok(!decisive);
            return out;
        }

        let remaining = Arc::new(AtomicUsize::new(bells.len()));
        for bell in bells {
            let out = out.clone();
            let remaining = Arc::clone(&remaining);
            bell.on_ring(move |value| match value {
                Ok(v) if *v == decisive => {
                    out.ring_ok(decisive);
                }
                Ok(_) => {
                    if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                        out.ring_ok(!decisive);
                    }
                }
                Err(e) => {
                    out.ring_err(e.clone());
                }
            });
        }
        out
    }
}

impl<T: Clone> Future for Bell<T> {
    type Output = Result<T, ChannelError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = lock(&self.inner.state);
        if let Some(value) = &state.value {
            return Poll::Ready(value.clone());
        }
        if !state.wakers.iter().any(|w| w.will_wake(cx.waker())) {
            state.wakers.push(cx.waker().clone());
        }
        Poll::Pending
    }
}

impl<T> fmt::Debug for Bell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let done = lock(&self.inner.state).value.is_some();
        f.debug_struct("Bell").field("done", &done).finish()
    }
}
