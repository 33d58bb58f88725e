use std::time::Duration;

use gatemesh_error::{GatemeshResult, SyncError};
use parking_lot::{Mutex, MutexGuard};

/// Guard, выдаваемый [`Lock::lock`]. Снимается при выходе из области.
pub type LockGuard<'a, T> = MutexGuard<'a, T>;

/// Взаимное исключение над значением `T`.
///
/// В отличие от `std::sync::Mutex`, не "отравляется" при панике в
/// критической секции: паника внутри `Receive` модуля не должна выводить из
/// строя очередь брокера.
#[derive(Debug, Default)]
pub struct Lock<T> {
    inner: Mutex<T>,
}

impl<T> Lock<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    /// Захватывает блокировку, ожидая без ограничения.
    pub fn lock(&self) -> LockGuard<'_, T> {
        self.inner.lock()
    }

    /// Пытается захватить блокировку в течение `timeout`.
    pub fn try_lock_for(
        &self,
        timeout: Duration,
    ) -> GatemeshResult<LockGuard<'_, T>> {
        self.inner.try_lock_for(timeout).ok_or_else(|| {
            SyncError::Timeout {
                millis: timeout.as_millis() as u64,
            }
            .into()
        })
    }

    /// Неблокирующая попытка захвата.
    pub fn try_lock(&self) -> Option<LockGuard<'_, T>> {
        self.inner.try_lock()
    }

    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }

    /// Доступ без блокировки при эксклюзивном владении.
    pub fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use gatemesh_error::StatusCode;

    use super::*;

    #[test]
    fn test_lock_protects_counter() {
        let lock = Arc::new(Lock::new(0usize));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lock = Arc::clone(&lock);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        *lock.lock() += 1;
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*lock.lock(), 8000);
    }

    /// Тест проверяет, что `try_lock_for` возвращает `Timeout`, пока
    /// блокировка удерживается другим владельцем.
    #[test]
    fn test_try_lock_for_times_out() {
        let lock = Lock::new(());
        let _held = lock.lock();
        let err = lock.try_lock_for(Duration::from_millis(10)).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::Timeout);
    }

    #[test]
    fn test_try_lock_and_into_inner() {
        let mut lock = Lock::new(vec![1, 2]);
        lock.get_mut().push(3);
        assert!(lock.try_lock().is_some());
        assert_eq!(lock.into_inner(), vec![1, 2, 3]);
    }
}
