//! Observable cells and debounced effects.
//!
//! An [`Observable`] is a single value whose writes notify subscribers. A
//! derived rule declares the observables it depends on as a list of
//! [`Dependency`] handles; [`throttled_effect`] re-runs the rule once its
//! inputs have been quiet for a window.

use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;

use futures::future::{self, BoxFuture};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// A single observable value.
#[derive(Debug)]
pub struct Observable<T> {
  tx: watch::Sender<T>,
}

impl<T: Send + Sync + 'static> Observable<T> {
  pub fn new(value: T) -> Self {
    let (tx, _rx) = watch::channel(value);
    Self { tx }
  }

  pub fn read(&self) -> T
  where
    T: Clone,
  {
    self.tx.borrow().clone()
  }

  /// Read through a borrow. `f` must not write to this observable.
  pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
    f(&self.tx.borrow())
  }

  /// Replace the value, notifying only if it differs.
  pub fn write(&self, value: T)
  where
    T: PartialEq,
  {
    self.tx.send_if_modified(move |current| {
      if *current == value {
        return false;
      }
      *current = value;
      true
    });
  }

  /// Modify in place. `f` reports whether anything changed; subscribers are
  /// notified only then.
  pub fn update(&self, f: impl FnOnce(&mut T) -> bool) -> bool {
    self.tx.send_if_modified(f)
  }

  /// Handle that resolves on every subsequent change.
  pub fn subscribe(&self) -> Dependency {
    Dependency {
      source: Box::new(self.tx.subscribe()),
    }
  }
}

trait ChangeSource: Send {
  /// Resolves `false` once the observable is gone.
  fn changed(&mut self) -> BoxFuture<'_, bool>;
}

impl<T: Send + Sync> ChangeSource for watch::Receiver<T> {
  fn changed(&mut self) -> BoxFuture<'_, bool> {
    Box::pin(async move { watch::Receiver::changed(self).await.is_ok() })
  }
}

/// Type-erased change notification from one observable.
pub struct Dependency {
  source: Box<dyn ChangeSource>,
}

impl Dependency {
  /// Wait for the next change; `false` if the observable was dropped.
  pub async fn changed(&mut self) -> bool {
    self.source.changed().await
  }
}

/// Wait until any dependency changes. `false` once one of them is gone.
async fn any_changed(deps: &mut [Dependency]) -> bool {
  if deps.is_empty() {
    return future::pending().await;
  }
  let (alive, _, _) = future::select_all(deps.iter_mut().map(|d| d.source.changed())).await;
  alive
}

/// Spawn a task running `effect` each time `deps` change and then stay quiet
/// for `window`. Changes inside the window restart it, so a burst of writes
/// produces one run.
///
/// The task ends when a dependency is dropped or `effect` breaks. Returns
/// `None` outside a Tokio runtime.
pub fn throttled_effect<F, Fut>(
  mut deps: Vec<Dependency>,
  window: Duration,
  mut effect: F,
) -> Option<JoinHandle<()>>
where
  F: FnMut() -> Fut + Send + 'static,
  Fut: Future<Output = ControlFlow<()>> + Send + 'static,
{
  let runtime = tokio::runtime::Handle::try_current().ok()?;

  Some(runtime.spawn(async move {
    loop {
      if !any_changed(&mut deps).await {
        return;
      }

      loop {
        tokio::select! {
          _ = tokio::time::sleep(window) => break,
          alive = any_changed(&mut deps) => {
            if !alive {
              return;
            }
          }
        }
      }

      if effect().await.is_break() {
        return;
      }
    }
  }))
}
