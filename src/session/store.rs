//! 会话存储
//!
//! 发送者 -> 会话槽位。每个槽位一把 `tokio::sync::Mutex`：同一发送者的消息串行处理，
//! 持锁期间完成「读状态 -> 查询/写账本 -> 写回状态」；不同发送者完全并行。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::state::SessionState;

/// 单个发送者的槽位
#[derive(Debug)]
pub struct SessionSlot {
    state: SessionState,
    last_active: Instant,
}

impl SessionSlot {
    fn new() -> Self {
        Self {
            state: SessionState::Idle,
            last_active: Instant::now(),
        }
    }

    fn is_expired(&self, timeout: Option<Duration>) -> bool {
        match timeout {
            Some(t) => !self.state.is_idle() && self.last_active.elapsed() > t,
            None => false,
        }
    }
}

/// 独占某个发送者会话的守卫；drop 时释放
pub struct SessionGuard {
    sender: String,
    slot: OwnedMutexGuard<SessionSlot>,
}

impl SessionGuard {
    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn state(&self) -> &SessionState {
        &self.slot.state
    }

    /// 写入新状态（写入 Idle 等价于删除会话）
    pub fn set(&mut self, state: SessionState) {
        self.slot.state = state;
        self.slot.last_active = Instant::now();
    }

    /// 删除会话；返回之前是否存在会话
    pub fn clear(&mut self) -> bool {
        let had_session = !self.slot.state.is_idle();
        self.set(SessionState::Idle);
        had_session
    }
}

/// 进程内会话存储，生命周期随进程，不持久化
pub struct SessionStore {
    slots: RwLock<HashMap<String, Arc<Mutex<SessionSlot>>>>,
    /// 空闲过期时间；None 表示永不过期
    idle_timeout: Option<Duration>,
}

impl SessionStore {
    pub fn new(idle_timeout: Option<Duration>) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            idle_timeout,
        }
    }

    async fn slot(&self, sender: &str) -> Arc<Mutex<SessionSlot>> {
        {
            let slots = self.slots.read().await;
            if let Some(slot) = slots.get(sender) {
                return Arc::clone(slot);
            }
        }

        let mut slots = self.slots.write().await;
        Arc::clone(
            slots
                .entry(sender.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(SessionSlot::new()))),
        )
    }

    /// 独占发送者的会话，直到守卫被 drop；过期会话在此重置为 Idle
    pub async fn lock(&self, sender: &str) -> SessionGuard {
        let mut slot = self.slot(sender).await.lock_owned().await;

        if slot.is_expired(self.idle_timeout) {
            tracing::warn!(
                sender = %sender,
                state = slot.state.name(),
                "Session expired after inactivity, resetting to idle"
            );
            slot.state = SessionState::Idle;
        }

        SessionGuard {
            sender: sender.to_string(),
            slot,
        }
    }

    /// 释放守卫；会话为 Idle 且无其他消息等待时移除槽位，不再保留 Idle 条目
    pub async fn release(&self, guard: SessionGuard) {
        if !guard.state().is_idle() {
            return;
        }
        let SessionGuard { sender, slot } = guard;
        drop(slot);

        let mut slots = self.slots.write().await;
        let removable = match slots.get(&sender) {
            // 持有写锁时，引用计数为 1 说明没有其他消息拿到这个槽位
            Some(slot) if Arc::strong_count(slot) == 1 => {
                slot.try_lock().map(|s| s.state.is_idle()).unwrap_or(false)
            }
            _ => false,
        };
        if removable {
            slots.remove(&sender);
        }
    }

    /// 当前保留的槽位数（含尚未清理的 Idle 槽位）
    pub async fn slot_count(&self) -> usize {
        self.slots.read().await.len()
    }

    /// 当前状态的拷贝（会等待正在处理的同一发送者消息）
    pub async fn snapshot(&self, sender: &str) -> SessionState {
        let slot = {
            let slots = self.slots.read().await;
            match slots.get(sender) {
                Some(slot) => Arc::clone(slot),
                None => return SessionState::Idle,
            }
        };
        let slot = slot.lock().await;
        if slot.is_expired(self.idle_timeout) {
            SessionState::Idle
        } else {
            slot.state.clone()
        }
    }

    /// 非 Idle 且未过期的会话数
    pub async fn active_count(&self) -> usize {
        let slots: Vec<_> = self.slots.read().await.values().cloned().collect();
        let mut count = 0;
        for slot in slots {
            let slot = slot.lock().await;
            if !slot.state.is_idle() && !slot.is_expired(self.idle_timeout) {
                count += 1;
            }
        }
        count
    }

    /// 移除 Idle 或已过期、且无人持有的槽位；返回移除的过期会话数
    pub async fn cleanup_expired(&self) -> usize {
        let mut slots = self.slots.write().await;
        let mut expired = 0;

        slots.retain(|sender, slot| {
            // 持有写锁时，引用计数为 1 说明没有消息正在等待或处理这个槽位
            if Arc::strong_count(slot) > 1 {
                return true;
            }
            let Ok(guard) = slot.try_lock() else {
                return true;
            };
            if guard.is_expired(self.idle_timeout) {
                tracing::info!(sender = %sender, state = guard.state.name(), "Removing expired session");
                expired += 1;
                return false;
            }
            !guard.state.is_idle()
        });

        expired
    }

    /// 周期性清理过期会话，直到 `cancel` 触发
    pub fn spawn_sweeper(self: Arc<Self>, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = self.cleanup_expired().await;
                        if removed > 0 {
                            tracing::debug!("Session sweeper removed {} expired sessions", removed);
                        }
                    }
                }
            }
        })
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(None)
    }
}
