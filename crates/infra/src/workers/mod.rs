//! Background workers.

pub mod command_consumer;

pub use command_consumer::{
    CommandConsumer, ConsumerConfig, ConsumerHandle, ConsumerStats, DeadLetter, Delivery,
};
