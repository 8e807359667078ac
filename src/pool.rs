//! # Pool de Objetos con Capacidad Acotada
//! src/pool.rs
//!
//! Pool genérico usado por los stages de compresión y buffer. El ciclo de
//! vida de cada objeto lo define un `Lifecycle`:
//!
//! - `create`: construye uno nuevo cuando no hay ninguno ocioso
//! - `reset`: lo deja en estado neutro al devolverlo
//! - `dispose`: lo termina cuando el pool ya está lleno
//!
//! Un objeto adquirido pertenece a un solo dueño hasta que se libera.

use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, PoisonError};

/// Define cómo se crean, reciclan y descartan los objetos del pool
pub trait Lifecycle<T>: Send + Sync {
    fn create(&self) -> T;

    fn reset(&self, item: &mut T);

    fn dispose(&self, item: T) {
        drop(item);
    }
}

/// Pool thread-safe de objetos reciclables
pub struct Pool<T, M: Lifecycle<T>> {
    idle: Mutex<Vec<T>>,
    capacity: usize,
    lifecycle: M,
}

impl<T, M: Lifecycle<T>> Pool<T, M> {
    /// Crea el pool con `initial` objetos pre-construidos (acotado por `capacity`)
    pub fn new(lifecycle: M, initial: usize, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let idle = (0..initial.min(capacity)).map(|_| lifecycle.create()).collect();
        Self {
            idle: Mutex::new(idle),
            capacity,
            lifecycle,
        }
    }

    /// Toma un objeto ocioso o construye uno nuevo
    pub fn acquire(&self) -> T {
        let reused = self.lock().pop();
        reused.unwrap_or_else(|| self.lifecycle.create())
    }

    /// Resetea el objeto y lo devuelve al pool, o lo descarta si está lleno
    pub fn release(&self, mut item: T) {
        self.lifecycle.reset(&mut item);
        let overflow = {
            let mut idle = self.lock();
            if idle.len() >= self.capacity {
                Some(item)
            } else {
                idle.push(item);
                None
            }
        };
        if let Some(item) = overflow {
            self.lifecycle.dispose(item);
        }
    }

    /// Adquiere un objeto que vuelve al pool automáticamente al soltarse
    pub fn get(&self) -> Pooled<'_, T, M> {
        Pooled {
            item: Some(self.acquire()),
            pool: self,
        }
    }

    /// Objetos ociosos en este momento
    pub fn idle(&self) -> usize {
        self.lock().len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn lifecycle(&self) -> &M {
        &self.lifecycle
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<T>> {
        // Un panic con el lock tomado no deja el Vec en estado inválido
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T, M: Lifecycle<T>> Drop for Pool<T, M> {
    fn drop(&mut self) {
        let idle = std::mem::take(self.idle.get_mut().unwrap_or_else(PoisonError::into_inner));
        for item in idle {
            self.lifecycle.dispose(item);
        }
    }
}

/// Objeto prestado por un `Pool`
pub struct Pooled<'p, T, M: Lifecycle<T>> {
    item: Option<T>,
    pool: &'p Pool<T, M>,
}

impl<T, M: Lifecycle<T>> Deref for Pooled<'_, T, M> {
    type Target = T;

    fn deref(&self) -> &T {
        // `item` solo es None dentro de drop
        self.item.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl<T, M: Lifecycle<T>> DerefMut for Pooled<'_, T, M> {
    fn deref_mut(&mut self) -> &mut T {
        self.item.as_mut().unwrap_or_else(|| unreachable!())
    }
}

impl<T, M: Lifecycle<T>> Drop for Pooled<'_, T, M> {
    fn drop(&mut self) {
        if let Some(item) = self.item.take() {
            self.pool.release(item);
        }
    }
}
