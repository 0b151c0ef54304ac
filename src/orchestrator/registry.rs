//! Decoder factories keyed by id
//!
//! The registry is read-mostly: lookups, listing and search never mutate it
//! and may run concurrently; registration takes the write lock and
//! overwrites any prior factory for the same id.

use crate::descriptor::DecoderDescriptor;
use crate::engine::Matcher;
use crate::streaming::ChunkProcessor;
use crate::{DecodeError, Result};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::{debug, info};

/// Capability interface every protocol decoder implements
///
/// A decoder is constructed fresh per run by its registered factory,
/// carries its static [`DecoderDescriptor`], and expresses its bit
/// semantics entirely through the matcher's `wait`/`put` primitives.
pub trait Decoder: Send {
    fn descriptor(&self) -> &DecoderDescriptor;

    /// Run to completion over the matcher's prepared buffers
    ///
    /// Decoders typically loop until `wait` reports
    /// [`crate::DecodeError::EndOfSamples`] and treat that as "no more
    /// frames", returning `Ok(())`.
    fn decode(&mut self, matcher: &mut Matcher) -> Result<()>;
}

type DecoderFactory = Box<dyn Fn() -> Box<dyn Decoder> + Send + Sync>;
type StreamingFactory = Box<dyn Fn() -> Box<dyn ChunkProcessor> + Send + Sync>;

struct Registration {
    factory: DecoderFactory,
    /// Captured once at registration for search without instantiation
    descriptor: DecoderDescriptor,
}

/// Registry of decoder types
#[derive(Default)]
pub struct DecoderRegistry {
    decoders: RwLock<HashMap<String, Registration>>,
    streaming: RwLock<HashMap<String, StreamingFactory>>,
}

impl DecoderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a decoder factory; an existing factory for the id is
    /// overwritten
    pub fn register<F>(&self, id: &str, factory: F)
    where
        F: Fn() -> Box<dyn Decoder> + Send + Sync + 'static,
    {
        let descriptor = factory().descriptor().clone();
        let replaced = self
            .decoders
            .write()
            .expect("registry lock poisoned")
            .insert(
                id.to_string(),
                Registration {
                    factory: Box::new(factory),
                    descriptor,
                },
            )
            .is_some();
        if replaced {
            info!("re-registered decoder '{}'", id);
        } else {
            debug!("registered decoder '{}'", id);
        }
    }

    /// Register a streaming (chunk-hook) factory for an id
    pub fn register_streaming<F>(&self, id: &str, factory: F)
    where
        F: Fn() -> Box<dyn ChunkProcessor> + Send + Sync + 'static,
    {
        self.streaming
            .write()
            .expect("registry lock poisoned")
            .insert(id.to_string(), Box::new(factory));
        debug!("registered streaming decoder '{}'", id);
    }

    /// Instantiate a fresh decoder
    pub fn create(&self, id: &str) -> Result<Box<dyn Decoder>> {
        let decoders = self.decoders.read().expect("registry lock poisoned");
        decoders
            .get(id)
            .map(|r| (r.factory)())
            .ok_or_else(|| DecodeError::UnknownDecoder(id.to_string()))
    }

    /// Instantiate a streaming processor, when one is registered
    pub fn create_streaming(&self, id: &str) -> Option<Box<dyn ChunkProcessor>> {
        let streaming = self.streaming.read().expect("registry lock poisoned");
        streaming.get(id).map(|f| f())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.decoders
            .read()
            .expect("registry lock poisoned")
            .contains_key(id)
    }

    pub fn contains_streaming(&self, id: &str) -> bool {
        self.streaming
            .read()
            .expect("registry lock poisoned")
            .contains_key(id)
    }

    /// Registered decoder ids, sorted
    pub fn list_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .decoders
            .read()
            .expect("registry lock poisoned")
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    /// Descriptor captured at registration time
    pub fn descriptor(&self, id: &str) -> Option<DecoderDescriptor> {
        self.decoders
            .read()
            .expect("registry lock poisoned")
            .get(id)
            .map(|r| r.descriptor.clone())
    }

    /// Case-insensitive search over id, name, long name and tags
    pub fn search(&self, needle: &str) -> Vec<String> {
        let needle = needle.to_lowercase();
        let decoders = self.decoders.read().expect("registry lock poisoned");
        let mut hits: Vec<String> = decoders
            .iter()
            .filter(|(id, reg)| {
                let d = &reg.descriptor;
                id.to_lowercase().contains(&needle)
                    || d.name.to_lowercase().contains(&needle)
                    || d.longname.to_lowercase().contains(&needle)
                    || d.tags.iter().any(|t| t.to_lowercase().contains(&needle))
            })
            .map(|(id, _)| id.clone())
            .collect();
        hits.sort();
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Dummy {
        descriptor: DecoderDescriptor,
    }

    impl Dummy {
        fn boxed(name: &str, tags: &[&str]) -> Box<dyn Decoder> {
            Box::new(Self {
                descriptor: DecoderDescriptor {
                    id: name.to_lowercase(),
                    name: name.to_string(),
                    tags: tags.iter().map(|t| t.to_string()).collect(),
                    ..Default::default()
                },
            })
        }
    }

    impl Decoder for Dummy {
        fn descriptor(&self) -> &DecoderDescriptor {
            &self.descriptor
        }

        fn decode(&mut self, _matcher: &mut Matcher) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_create_unknown_decoder() {
        let registry = DecoderRegistry::new();
        match registry.create("nope") {
            Err(DecodeError::UnknownDecoder(id)) => assert_eq!(id, "nope"),
            Err(other) => panic!("wrong error: {}", other),
            Ok(_) => panic!("unregistered id must not resolve"),
        }
    }

    #[test]
    fn test_register_and_create() {
        let registry = DecoderRegistry::new();
        registry.register("uart", || Dummy::boxed("UART", &["serial"]));
        assert!(registry.contains("uart"));
        let decoder = registry.create("uart").expect("registered");
        assert_eq!(decoder.descriptor().name, "UART");
    }

    #[test]
    fn test_reregister_overwrites() {
        let registry = DecoderRegistry::new();
        registry.register("x", || Dummy::boxed("First", &[]));
        registry.register("x", || Dummy::boxed("Second", &[]));
        assert_eq!(registry.create("x").unwrap().descriptor().name, "Second");
        assert_eq!(registry.list_ids(), vec!["x"]);
    }

    #[test]
    fn test_search_over_name_and_tags() {
        let registry = DecoderRegistry::new();
        registry.register("i2c", || Dummy::boxed("I2C", &["bus", "embedded"]));
        registry.register("spi", || Dummy::boxed("SPI", &["bus"]));
        registry.register("can", || Dummy::boxed("CAN", &["automotive"]));
        assert_eq!(registry.search("bus"), vec!["i2c", "spi"]);
        assert_eq!(registry.search("I2"), vec!["i2c"]);
        assert!(registry.search("ethernet").is_empty());
    }
}
