//! 令牌桶限流器
//!
//! 进程内的准入控制，桶状态不持久化：重启丢失是可接受的。
//! 每个 key 的桶更新在单一临界区内完成，满足并发访问下的原子性。

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use domain::Channel;

/// 单个 key 的令牌桶
#[derive(Debug, Clone)]
struct Bucket {
    /// 剩余令牌
    tokens: u32,
    /// 最后一次补充/消费时间
    updated_at: Instant,
}

/// 限流判定结果
#[derive(Debug, Clone, PartialEq)]
pub struct RateDecision {
    pub allowed: bool,
    /// 拒绝时距离窗口完全补满的剩余时间
    pub retry_after: Option<Duration>,
}

impl RateDecision {
    fn allowed() -> Self {
        Self {
            allowed: true,
            retry_after: None,
        }
    }

    fn rejected(retry_after: Duration) -> Self {
        Self {
            allowed: false,
            retry_after: Some(retry_after),
        }
    }
}

/// 令牌桶限流器
///
/// 窗口语义：距上次更新超过一个完整窗口时令牌补满到容量；
/// 令牌不足时拒绝，并报告窗口补满所需的剩余时间。
pub struct RateLimiter {
    capacity: u32,
    window: Duration,
    buckets: RwLock<HashMap<String, Bucket>>,
}

impl RateLimiter {
    pub fn new(capacity: u32, window: Duration) -> Self {
        Self {
            capacity,
            window,
            buckets: RwLock::new(HashMap::new()),
        }
    }

    /// 尝试从 key 对应的桶中扣除 cost 个令牌
    pub fn consume(&self, key: &str, cost: u32) -> RateDecision {
        let now = Instant::now();
        // 临界区内没有可 panic 的操作，毒化锁直接恢复内部状态
        let mut buckets = self
            .buckets
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let bucket = buckets.entry(key.to_string()).or_insert(Bucket {
            tokens: self.capacity,
            updated_at: now,
        });

        let elapsed = now.duration_since(bucket.updated_at);
        if elapsed > self.window {
            bucket.tokens = self.capacity;
            bucket.updated_at = now;
        }

        if bucket.tokens < cost {
            let elapsed = now.duration_since(bucket.updated_at);
            let retry_after = self.window.saturating_sub(elapsed);
            return RateDecision::rejected(retry_after);
        }

        bucket.tokens -= cost;
        bucket.updated_at = now;
        RateDecision::allowed()
    }
}

/// 按通道划分的限流器表
///
/// key 组合：tenant + channel + (address | user id | conversation id | "anonymous")
pub struct ChannelRateLimiters {
    chat: RateLimiter,
    toast: RateLimiter,
    email: RateLimiter,
    push: RateLimiter,
    log: RateLimiter,
}

impl ChannelRateLimiters {
    pub fn new() -> Self {
        let window = Duration::from_secs(60);
        Self {
            chat: RateLimiter::new(20, window),
            toast: RateLimiter::new(120, window),
            email: RateLimiter::new(20, window),
            push: RateLimiter::new(60, window),
            log: RateLimiter::new(240, window),
        }
    }

    fn limiter_for(&self, channel: Channel) -> &RateLimiter {
        match channel {
            Channel::Chat => &self.chat,
            Channel::Toast => &self.toast,
            Channel::Email => &self.email,
            Channel::Push => &self.push,
            Channel::Log => &self.log,
        }
    }

    /// 对一次投递请求做准入判定
    pub fn consume(
        &self,
        tenant_id: &str,
        channel: Channel,
        identity: Option<&str>,
    ) -> RateDecision {
        let key = format!(
            "{}:{}:{}",
            tenant_id,
            channel.as_str(),
            identity.unwrap_or("anonymous")
        );
        self.limiter_for(channel).consume(&key, 1)
    }
}

impl Default for ChannelRateLimiters {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_then_reject_with_retry_after() {
        let limiter = RateLimiter::new(20, Duration::from_secs(60));

        for i in 0..20 {
            let decision = limiter.consume("k", 1);
            assert!(decision.allowed, "call {} should be allowed", i + 1);
        }

        let decision = limiter.consume("k", 1);
        assert!(!decision.allowed);
        let retry_after = decision.retry_after.expect("retry_after must be reported");
        assert!(retry_after > Duration::ZERO);
        assert!(retry_after <= Duration::from_secs(60));
    }

    #[test]
    fn window_elapse_refills_tokens() {
        let limiter = RateLimiter::new(2, Duration::from_millis(80));

        assert!(limiter.consume("k", 1).allowed);
        assert!(limiter.consume("k", 1).allowed);
        assert!(!limiter.consume("k", 1).allowed);

        std::thread::sleep(Duration::from_millis(120));

        assert!(limiter.consume("k", 1).allowed);
    }

    #[test]
    fn buckets_are_isolated_per_key() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));

        assert!(limiter.consume("a", 1).allowed);
        assert!(!limiter.consume("a", 1).allowed);
        assert!(limiter.consume("b", 1).allowed);
    }

    #[test]
    fn channel_table_uses_distinct_buckets() {
        let limiters = ChannelRateLimiters::new();

        for _ in 0..20 {
            assert!(limiters.consume("t", Channel::Chat, Some("addr")).allowed);
        }
        assert!(!limiters.consume("t", Channel::Chat, Some("addr")).allowed);

        // 同一身份在 toast 通道有独立配额
        assert!(limiters.consume("t", Channel::Toast, Some("addr")).allowed);
        // 匿名身份使用独立的桶
        assert!(limiters.consume("t", Channel::Chat, None).allowed);
    }

    #[test]
    fn concurrent_consumption_never_exceeds_capacity() {
        use std::sync::Arc;

        let limiter = Arc::new(RateLimiter::new(50, Duration::from_secs(60)));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let limiter = limiter.clone();
            handles.push(std::thread::spawn(move || {
                let mut allowed = 0u32;
                for _ in 0..20 {
                    if limiter.consume("shared", 1).allowed {
                        allowed += 1;
                    }
                }
                allowed
            }));
        }

        let total: u32 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 50);
    }
}
