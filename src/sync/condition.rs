use std::time::Duration;

use gatemesh_error::{GatemeshResult, SyncError};
use parking_lot::Condvar;

use super::LockGuard;

/// Сколько ждать сигнала условия.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitTimeout {
    /// Ждать до сигнала.
    #[default]
    Infinite,
    /// Ждать не дольше указанного числа миллисекунд.
    Millis(u64),
}

impl WaitTimeout {
    /// Нулевой таймаут трактуется как бесконечное ожидание.
    pub fn from_millis(millis: u64) -> Self {
        if millis == 0 {
            Self::Infinite
        } else {
            Self::Millis(millis)
        }
    }
}

/// Условная переменная для блокирующего ожидания без активного опроса.
///
/// Всегда используется вместе с [`super::Lock`]: ожидание атомарно
/// освобождает блокировку и захватывает её снова перед возвратом.
#[derive(Debug, Default)]
pub struct Condition {
    inner: Condvar,
}

impl Condition {
    pub fn new() -> Self {
        Self {
            inner: Condvar::new(),
        }
    }

    /// Будит одного ожидающего. Возвращает `true`, если кто-то проснулся.
    pub fn post(&self) -> bool {
        self.inner.notify_one()
    }

    /// Будит всех ожидающих; возвращает их количество.
    pub fn post_all(&self) -> usize {
        self.inner.notify_all()
    }

    /// Ожидает сигнала.
    ///
    /// Возможны ложные пробуждения: вызывающий обязан перепроверить своё
    /// условие в цикле.
    pub fn wait<T>(
        &self,
        guard: &mut LockGuard<'_, T>,
        timeout: WaitTimeout,
    ) -> GatemeshResult<()> {
        match timeout {
            WaitTimeout::Infinite => {
                self.inner.wait(guard);
                Ok(())
            }
            WaitTimeout::Millis(millis) => {
                let result = self.inner.wait_for(guard, Duration::from_millis(millis));
                if result.timed_out() {
                    Err(SyncError::Timeout { millis }.into())
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Ждёт, пока `condition` не станет ложным (аналог `Condvar::wait_while`).
    pub fn wait_while<T, F>(
        &self,
        guard: &mut LockGuard<'_, T>,
        mut condition: F,
    ) where
        F: FnMut(&mut T) -> bool,
    {
        while condition(&mut **guard) {
            self.inner.wait(guard);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use gatemesh_error::StatusCode;

    use super::*;
    use crate::sync::Lock;

    #[test]
    fn test_wait_times_out_without_post() {
        let lock = Lock::new(false);
        let cond = Condition::new();
        let mut guard = lock.lock();
        let err = cond.wait(&mut guard, WaitTimeout::Millis(20)).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::Timeout);
    }

    /// Тест проверяет, что `post` будит поток, ожидающий без таймаута.
    #[test]
    fn test_post_wakes_waiter() {
        let shared = Arc::new((Lock::new(false), Condition::new()));
        let waiter = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || {
                let (lock, cond) = &*shared;
                let mut ready = lock.lock();
                while !*ready {
                    cond.wait(&mut ready, WaitTimeout::Infinite).unwrap();
                }
                *ready
            })
        };

        {
            let (lock, cond) = &*shared;
            *lock.lock() = true;
            cond.post_all();
        }
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn test_wait_while_returns_when_condition_clears() {
        let shared = Arc::new((Lock::new(3u32), Condition::new()));
        let producer = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || {
                for _ in 0..3 {
                    let (lock, cond) = &*shared;
                    *lock.lock() -= 1;
                    cond.post();
                }
            })
        };
        let (lock, cond) = &*shared;
        let mut guard = lock.lock();
        cond.wait_while(&mut guard, |left| *left > 0);
        assert_eq!(*guard, 0);
        drop(guard);
        producer.join().unwrap();
    }

    #[test]
    fn test_zero_millis_means_infinite() {
        assert_eq!(WaitTimeout::from_millis(0), WaitTimeout::Infinite);
        assert_eq!(WaitTimeout::from_millis(5), WaitTimeout::Millis(5));
    }
}
