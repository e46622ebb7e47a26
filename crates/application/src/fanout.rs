//! 实时事件扇出
//!
//! 按收件人地址维护存活连接注册表。一个地址可以同时持有多个连接
//! （多标签页/多设备），每个连接都会收到发给该地址的全部事件。
//! 注册表是进程内状态：多进程部署需要外部代理做跨实例扇出，
//! 这是已记录的扩展限制。

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use domain::{Address, Timestamp};

/// 消息事件负载
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    pub id: String,
    pub text: String,
    pub address: String,
    pub created_at: Timestamp,
}

/// 扇出事件
///
/// 订阅方必须把 message 事件当作按条目ID去重的 upsert 处理：
/// 多个发布者竞争时不保证到达顺序。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InboxEvent {
    #[serde(rename = "chat.message", rename_all = "camelCase")]
    Message {
        conversation_id: String,
        message: MessagePayload,
    },
    #[serde(rename = "chat.typing", rename_all = "camelCase")]
    Typing {
        conversation_id: String,
        from: String,
        typing: bool,
    },
    #[serde(rename = "chat.read", rename_all = "camelCase")]
    Read {
        conversation_id: String,
        by: String,
        at: Timestamp,
    },
}

impl InboxEvent {
    /// 事件流中的事件名
    pub fn event_name(&self) -> &'static str {
        match self {
            InboxEvent::Message { .. } => "message",
            InboxEvent::Typing { .. } => "typing",
            InboxEvent::Read { .. } => "read",
        }
    }
}

type ConnectionMap = HashMap<String, HashMap<Uuid, mpsc::UnboundedSender<InboxEvent>>>;

/// 存活连接注册表
pub struct FanoutHub {
    connections: RwLock<ConnectionMap>,
}

impl FanoutHub {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    // 临界区内没有可 panic 的操作，毒化锁直接恢复内部状态
    fn write_connections(&self) -> RwLockWriteGuard<'_, ConnectionMap> {
        self.connections
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 为收件人地址建立一条新的订阅连接
    pub fn subscribe(self: &Arc<Self>, address: Address) -> Subscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();

        self.write_connections()
            .entry(address.as_str().to_string())
            .or_default()
            .insert(id, sender);

        tracing::debug!(address = %address, connection_id = %id, "订阅者连接建立");

        Subscription {
            id,
            address,
            receiver,
            hub: Arc::clone(self),
        }
    }

    /// 向目标地址集合发布事件；目标列表内部去重
    pub fn publish(&self, targets: &[Address], event: InboxEvent) {
        let mut dead: Vec<(String, Uuid)> = Vec::new();
        {
            let connections = match self.connections.read() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let mut seen = std::collections::HashSet::new();
            for address in targets {
                if !seen.insert(address.as_str()) {
                    continue;
                }
                let Some(bucket) = connections.get(address.as_str()) else {
                    continue;
                };
                for (id, sender) in bucket {
                    if sender.send(event.clone()).is_err() {
                        dead.push((address.as_str().to_string(), *id));
                    }
                }
            }
        }

        // 写入失败的连接立即清理
        if !dead.is_empty() {
            let mut connections = self.write_connections();
            for (address, id) in dead {
                if let Some(bucket) = connections.get_mut(&address) {
                    bucket.remove(&id);
                    if bucket.is_empty() {
                        connections.remove(&address);
                    }
                }
            }
        }
    }

    fn unsubscribe(&self, address: &str, id: Uuid) {
        let mut connections = self.write_connections();
        if let Some(bucket) = connections.get_mut(address) {
            bucket.remove(&id);
            // 连接集合清空后整个地址条目一并移除
            if bucket.is_empty() {
                connections.remove(address);
            }
        }
        tracing::debug!(address = %address, connection_id = %id, "订阅者连接清理");
    }

    /// 当前某地址的连接数（测试与诊断用）
    pub fn connection_count(&self, address: &Address) -> usize {
        match self.connections.read() {
            Ok(connections) => connections
                .get(address.as_str())
                .map(|bucket| bucket.len())
                .unwrap_or(0),
            Err(_) => 0,
        }
    }
}

impl Default for FanoutHub {
    fn default() -> Self {
        Self::new()
    }
}

/// 一条订阅连接；Drop 时自动从注册表移除
pub struct Subscription {
    id: Uuid,
    address: Address,
    receiver: mpsc::UnboundedReceiver<InboxEvent>,
    hub: Arc<FanoutHub>,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub async fn recv(&mut self) -> Option<InboxEvent> {
        self.receiver.recv().await
    }

    /// 非阻塞读取（测试用）
    pub fn try_recv(&mut self) -> Option<InboxEvent> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.unsubscribe(self.address.as_str(), self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(value: &str) -> Address {
        Address::parse(value).unwrap()
    }

    fn typing_event() -> InboxEvent {
        InboxEvent::Typing {
            conversation_id: "c1".to_string(),
            from: "addr-a".to_string(),
            typing: true,
        }
    }

    #[tokio::test]
    async fn event_reaches_every_connection_of_target() {
        let hub = Arc::new(FanoutHub::new());
        let mut first = hub.subscribe(address("addr-a"));
        let mut second = hub.subscribe(address("addr-a"));
        let mut other = hub.subscribe(address("addr-b"));

        hub.publish(&[address("addr-a")], typing_event());

        assert_eq!(first.recv().await, Some(typing_event()));
        assert_eq!(second.recv().await, Some(typing_event()));
        assert!(other.try_recv().is_none());
    }

    #[tokio::test]
    async fn duplicate_targets_deliver_once() {
        let hub = Arc::new(FanoutHub::new());
        let mut subscription = hub.subscribe(address("addr-a"));

        hub.publish(&[address("addr-a"), address("addr-a")], typing_event());

        assert!(subscription.try_recv().is_some());
        assert!(subscription.try_recv().is_none());
    }

    #[tokio::test]
    async fn drop_cleans_registry_entry() {
        let hub = Arc::new(FanoutHub::new());
        let addr = address("addr-a");

        let first = hub.subscribe(addr.clone());
        let second = hub.subscribe(addr.clone());
        assert_eq!(hub.connection_count(&addr), 2);

        drop(first);
        assert_eq!(hub.connection_count(&addr), 1);

        drop(second);
        assert_eq!(hub.connection_count(&addr), 0);
    }

    #[tokio::test]
    async fn dead_receiver_is_pruned_on_publish() {
        let hub = Arc::new(FanoutHub::new());
        let addr = address("addr-a");

        let mut subscription = hub.subscribe(addr.clone());
        // 关闭接收端而不触发 Drop 清理
        subscription.receiver.close();

        hub.publish(&[addr.clone()], typing_event());
        assert_eq!(hub.connection_count(&addr), 0);
    }
}
