//! Remote delegate: every operation executed by another instance over its
//! task REST surface, behind the same executor contracts as the local ones.

pub mod client;
pub mod tasks;

pub use client::RestClient;
pub use tasks::{
    remote_executors, RestConsumerGroupOffsetResetter, RestConsumerGroupTopicOffsetFetcher,
    RestTopicOffsetForTimeFetcher, RestTopicOffsetRangeFetcher, RestTopicPurger,
    RestTopicRecordCounter, RestTopicRecordFetcher,
};
