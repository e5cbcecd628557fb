use std::fmt;
use std::str::FromStr;

/// Purchase intent carried through the provider's `custom_id` field, so a
/// capture never has to trust the second request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Correlation {
    Coins {
        owner_id: String,
        shard: String,
    },
    Subscription {
        tier: i64,
        months: i64,
        owner_id: String,
        shard: String,
    },
    AutoRenew {
        owner_id: String,
        shard: String,
    },
}

impl fmt::Display for Correlation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Coins { owner_id, shard } => write!(f, "coins:{}:{}", owner_id, shard),
            Self::Subscription {
                tier,
                months,
                owner_id,
                shard,
            } => write!(f, "subscription:{}:{}:{}:{}", tier, months, owner_id, shard),
            Self::AutoRenew { owner_id, shard } => write!(f, "autorenew:{}:{}", owner_id, shard),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed correlation id")]
pub struct CorrelationParseError;

impl FromStr for Correlation {
    type Err = CorrelationParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        let non_empty = |v: &str| {
            if v.is_empty() {
                Err(CorrelationParseError)
            } else {
                Ok(v.to_string())
            }
        };

        match parts.as_slice() {
            ["coins", owner, shard] => Ok(Self::Coins {
                owner_id: non_empty(owner)?,
                shard: non_empty(shard)?,
            }),
            ["subscription", tier, months, owner, shard] => Ok(Self::Subscription {
                tier: tier.parse().map_err(|_| CorrelationParseError)?,
                months: months.parse().map_err(|_| CorrelationParseError)?,
                owner_id: non_empty(owner)?,
                shard: non_empty(shard)?,
            }),
            ["autorenew", owner, shard] => Ok(Self::AutoRenew {
                owner_id: non_empty(owner)?,
                shard: non_empty(shard)?,
            }),
            _ => Err(CorrelationParseError),
        }
    }
}
