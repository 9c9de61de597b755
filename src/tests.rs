//! Tests for loading, digesting and reducing

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::{
    create_hasher, keccak, shared_factory, zero_level, Artifact, CompiledModule, Digest,
    EngineState, Error, Hasher, HasherFactory, NativeRuntime, ReduceOptions, Result, Runtime,
    VIEW_SIZE,
};

/// contract ^ account || blockhash || nonce, as ASCII hex
const REDUCE_INPUT: &str = concat!(
    "7437b330e4c2d4e6de751155ebf00abdd2dce294f91e0132c5d6",
    "7b228fa7d958cb4cccf1ac9d0c02df47f768cc2036b006f6f21e",
    "0000000000000000"
);

type Hits = Arc<Mutex<Vec<(u64, u32, Digest)>>>;

fn recorder() -> (impl FnMut(u64, u32, &Digest) + Send + 'static, Hits) {
    let hits: Hits = Arc::default();
    let sink = Arc::clone(&hits);
    let callback = move |nonce: u64, zeros: u32, digest: &Digest| {
        sink.lock().unwrap().push((nonce, zeros, *digest));
    };
    (callback, hits)
}

fn nonces(hits: &Hits) -> Vec<(u64, u32)> {
    hits.lock()
        .unwrap()
        .iter()
        .map(|(nonce, zeros, _)| (*nonce, *zeros))
        .collect()
}

async fn hasher() -> Hasher {
    HasherFactory::keccak256()
        .unwrap()
        .create_hasher()
        .await
        .unwrap()
}

/// Native runtime that counts compilations
#[derive(Default)]
struct Counting {
    compiles: AtomicUsize,
}

impl Runtime for Counting {
    fn name(&self) -> &str {
        "counting"
    }

    fn compile(&self, artifact: &Artifact) -> Result<Arc<dyn CompiledModule>> {
        self.compiles.fetch_add(1, Ordering::SeqCst);
        NativeRuntime.compile(artifact)
    }
}

/// Native runtime whose first `failures` compilations fail
struct Flaky {
    failures: AtomicUsize,
    attempts: AtomicUsize,
}

impl Runtime for Flaky {
    fn name(&self) -> &str {
        "flaky"
    }

    fn compile(&self, artifact: &Artifact) -> Result<Arc<dyn CompiledModule>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(Error::ArtifactCompile {
                name: artifact.name().to_string(),
                reason: "injected failure".to_string(),
            });
        }
        NativeRuntime.compile(artifact)
    }
}

/// Runtime that cannot run on this host
struct Unavailable {
    compiles: AtomicUsize,
}

impl Runtime for Unavailable {
    fn name(&self) -> &str {
        "unavailable"
    }

    fn probe(&self) -> Result<()> {
        Err(Error::UnsupportedEnvironment(
            "module execution is disabled".to_string(),
        ))
    }

    fn compile(&self, artifact: &Artifact) -> Result<Arc<dyn CompiledModule>> {
        self.compiles.fetch_add(1, Ordering::SeqCst);
        NativeRuntime.compile(artifact)
    }
}

#[tokio::test]
async fn test_keccak_known_vectors() {
    assert_eq!(
        hex::encode(keccak(b"a").await.unwrap()),
        "3ac225168df54212a25c1c01fd35bebfea408fdac2e31ddd6f80a4bbf9a5f1cb"
    );
    assert_eq!(
        hex::encode(keccak(b"ab").await.unwrap()),
        "67fad3bfa1e0321bd021ca805ce14876e50acac8ca8532eda8cbf924da565160"
    );
    assert_eq!(
        hex::encode(keccak(b"abc").await.unwrap()),
        "4e03657aea45a94fc7d47ba826c8d667c0d1e6e33a64a036ec44f58fa12d6c45"
    );
}

#[tokio::test]
async fn test_keccak_is_deterministic() {
    let first = keccak(b"determinism").await.unwrap();
    let second = keccak(b"determinism").await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_shared_digest_matches_fresh_hasher() {
    let data = b"a";
    let shared = keccak(data).await.unwrap();

    let mut fresh = hasher().await;
    assert_eq!(fresh.digest(data).unwrap(), shared);

    let mut from_shared_factory = create_hasher().await.unwrap();
    assert_eq!(from_shared_factory.digest(data).unwrap(), shared);
}

#[tokio::test]
async fn test_shared_factory_compiles_once() {
    let _a = create_hasher().await.unwrap();
    let _b = create_hasher().await.unwrap();

    let cache = shared_factory().await.unwrap().loader().cache();
    assert_eq!(cache.len(), 1);
    assert!(cache.contains("keccak256"));
}

#[tokio::test]
async fn test_reduce_vectors() {
    let data = REDUCE_INPUT.as_bytes();
    let mut hasher = hasher().await;

    assert_eq!(
        hex::encode(hasher.reduce(data, ReduceOptions::default()).unwrap()),
        "9fe483af7d5a4f377b55b8164caa10361136e3cda19d04a8a1490295b5f2cb8f"
    );
    assert_eq!(
        hex::encode(hasher.reduce(data, ReduceOptions::new().range(0..0)).unwrap()),
        // "7437b330e4c2d4e6de751155ebf00abd" as ASCII
        "3734333762333330653463326434653664653735313135356562663030616264"
    );
    assert_eq!(
        hex::encode(hasher.reduce(data, ReduceOptions::new().range(0..1)).unwrap()),
        "9fe483af7d5a4f377b55b8164caa10361136e3cda19d04a8a1490295b5f2cb8f"
    );
    assert_eq!(
        hex::encode(hasher.reduce(data, ReduceOptions::new().range(0..4)).unwrap()),
        "8c65dc0cdc9b6ef1efbffa2dc1eb8374940335525eb8accb7b94f35651489b0a"
    );
}

#[tokio::test]
async fn test_reduce_million_nonces() {
    let data = REDUCE_INPUT.as_bytes();
    let mut hasher = hasher().await;
    let (callback, hits) = recorder();

    let last = hasher
        .reduce(
            data,
            ReduceOptions::new()
                .range(0..1_000_000)
                .zeros(4)
                .callback(callback),
        )
        .unwrap();

    assert_eq!(
        hex::encode(last),
        "1bc30d03ea9606dca227a6b168ff3579b51c6714a1ac2f580b6afa6223c04dc5"
    );

    let hits = nonces(&hits);
    assert!(!hits.is_empty());
    assert!(hits.windows(2).all(|pair| pair[0].0 < pair[1].0));
    assert!(hits.iter().all(|(_, zeros)| *zeros >= 4));
}

#[tokio::test]
async fn test_reduce_zero_inputs_like_digest() {
    let mut hasher = hasher().await;

    for len in [0usize, 1, 2, 4, 8] {
        let zeros = vec![0u8; len];
        let reduced = hasher.reduce(&zeros, ReduceOptions::default()).unwrap();
        let digest = hasher.digest(&zeros).unwrap();
        assert_eq!(reduced, digest, "length {}", len);
    }
}

#[tokio::test]
async fn test_single_nonce_range_is_digest_with_nonce() {
    let data = REDUCE_INPUT.as_bytes();
    let mut hasher = hasher().await;

    let reduced = hasher
        .reduce(data, ReduceOptions::new().range(5..6))
        .unwrap();

    let mut baked = data.to_vec();
    let tail = baked.len() - 8;
    baked[tail..].copy_from_slice(&5u64.to_be_bytes());
    assert_eq!(reduced, hasher.digest(&baked).unwrap());
    assert_eq!(
        hex::encode(reduced),
        "1bed7929c4ca85f4de890acd1a959a51607f5d6c366664c43d6fe09b985d84fa"
    );
}

#[tokio::test]
async fn test_callback_fires_at_threshold() {
    let data = REDUCE_INPUT.as_bytes();
    let mut hasher = hasher().await;
    let (callback, hits) = recorder();

    let last = hasher
        .reduce(
            data,
            ReduceOptions::new().range(0..64).zeros(4).callback(callback),
        )
        .unwrap();

    assert_eq!(nonces(&hits), vec![(17, 5), (18, 8), (24, 5)]);
    assert_eq!(
        hex::encode(last),
        "f3e46c62887a6b0f1bf56c55b185c23aae55ebf2b335577b8d16bee02e39d647"
    );

    let hits = hits.lock().unwrap();
    assert_eq!(
        hex::encode(hits[1].2),
        "00c84c32a467301b040671dec779a5abbef13338b12630ec244462b67bf83cc6"
    );
    for (_, zeros, digest) in hits.iter() {
        assert_eq!(zero_level(digest), *zeros);
    }
}

#[tokio::test]
async fn test_callback_depends_only_on_range_membership() {
    let data = REDUCE_INPUT.as_bytes();
    let mut hasher = hasher().await;

    let mut run = |range: std::ops::Range<u64>| {
        let (callback, hits) = recorder();
        hasher
            .reduce(
                data,
                ReduceOptions::new().range(range).zeros(4).callback(callback),
            )
            .unwrap();
        nonces(&hits)
    };

    assert_eq!(run(0..18), vec![(17, 5)]);
    assert_eq!(run(0..20), vec![(17, 5), (18, 8)]);
    assert_eq!(run(0..25), vec![(17, 5), (18, 8), (24, 5)]);
    assert_eq!(run(18..64), vec![(18, 8), (24, 5)]);
    assert_eq!(run(30..30), vec![]);
}

#[tokio::test]
async fn test_empty_range_returns_padded_prefix() {
    let mut hasher = hasher().await;

    // Leave a digest in the view first
    hasher.digest(b"something longer than thirty-two bytes").unwrap();

    let (callback, hits) = recorder();
    let result = hasher
        .reduce(b"abc", ReduceOptions::new().range(0..0).callback(callback))
        .unwrap();

    let mut expected = [0u8; 32];
    expected[..3].copy_from_slice(b"abc");
    assert_eq!(result, expected);
    assert!(hits.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_sequential_reduces_do_not_cross_talk() {
    let data = REDUCE_INPUT.as_bytes();
    let mut hasher = hasher().await;
    let (first, first_hits) = recorder();
    let (second, second_hits) = recorder();

    hasher
        .reduce(
            data,
            ReduceOptions::new().range(0..20).zeros(4).callback(first),
        )
        .unwrap();
    hasher
        .reduce(
            data,
            ReduceOptions::new().range(20..64).zeros(4).callback(second),
        )
        .unwrap();

    assert_eq!(nonces(&first_hits), vec![(17, 5), (18, 8)]);
    assert_eq!(nonces(&second_hits), vec![(24, 5)]);
}

#[tokio::test]
async fn test_callback_registration_released_after_reduce() {
    let data = REDUCE_INPUT.as_bytes();
    let mut hasher = hasher().await;
    let (callback, _hits) = recorder();

    hasher
        .reduce(data, ReduceOptions::new().range(0..32).callback(callback))
        .unwrap();
    assert!(hasher.engine().callbacks().unwrap().is_empty());

    // Also released when the reduce fails
    let oversized = vec![0u8; VIEW_SIZE + 1];
    assert!(hasher.reduce(&oversized, ReduceOptions::default()).is_err());
    assert!(hasher.engine().callbacks().unwrap().is_empty());
}

#[tokio::test]
async fn test_oversized_input_is_rejected() {
    let mut hasher = hasher().await;

    let err = hasher.digest(&vec![0u8; VIEW_SIZE + 1]).unwrap_err();
    assert!(matches!(
        err,
        Error::OversizedInput {
            len,
            max: VIEW_SIZE
        } if len == VIEW_SIZE + 1
    ));

    // Exactly one view's worth is fine, and the engine stays usable
    hasher.digest(&vec![0u8; VIEW_SIZE]).unwrap();
    assert_eq!(
        hex::encode(hasher.digest(b"abc").unwrap()),
        "4e03657aea45a94fc7d47ba826c8d667c0d1e6e33a64a036ec44f58fa12d6c45"
    );
}

#[tokio::test]
async fn test_engine_loads_lazily() {
    let factory = HasherFactory::keccak256().unwrap();
    let mut engine = factory.engine();

    assert_eq!(engine.state(), EngineState::Uninitialized);
    assert!(matches!(engine.try_digest(b"a"), Err(Error::NotReady)));
    assert!(factory.loader().cache().is_empty());

    let digest = engine.digest(b"a").await.unwrap();
    assert_eq!(engine.state(), EngineState::Ready);
    assert_eq!(
        hex::encode(digest),
        "3ac225168df54212a25c1c01fd35bebfea408fdac2e31ddd6f80a4bbf9a5f1cb"
    );

    // Repeated setup is a no-op
    engine.setup().await.unwrap();
    engine.setup().await.unwrap();
    assert_eq!(factory.loader().cache().len(), 1);
}

#[tokio::test]
async fn test_engine_reduce_loads_lazily() {
    let factory = HasherFactory::keccak256().unwrap();
    let mut engine = factory.engine();

    let reduced = engine
        .reduce(REDUCE_INPUT.as_bytes(), ReduceOptions::default())
        .await
        .unwrap();
    assert!(engine.is_ready());
    assert_eq!(
        hex::encode(reduced),
        "9fe483af7d5a4f377b55b8164caa10361136e3cda19d04a8a1490295b5f2cb8f"
    );
}

#[tokio::test]
async fn test_concurrent_engines_compile_once() {
    let runtime = Arc::new(Counting::default());
    let factory = HasherFactory::new(Artifact::keccak256().unwrap(), runtime.clone());

    let (a, b, c) = tokio::join!(
        factory.create_hasher(),
        factory.create_hasher(),
        factory.create_hasher()
    );
    let (mut a, mut b, mut c) = (a.unwrap(), b.unwrap(), c.unwrap());

    assert_eq!(runtime.compiles.load(Ordering::SeqCst), 1);

    // Each engine has its own memory
    let da = a.digest(b"a").unwrap();
    let db = b.digest(b"ab").unwrap();
    let dc = c.digest(b"abc").unwrap();
    assert_eq!(a.reduce(b"a", ReduceOptions::new().range(0..0)).unwrap()[0], b'a');
    assert_ne!(da, db);
    assert_ne!(db, dc);
}

#[tokio::test]
async fn test_checksum_mismatch_leaves_engine_retryable() {
    let bundled = Artifact::keccak256().unwrap();
    let tampered = Artifact::new("keccak256", bundled.bytes().to_vec(), "00000000");
    let factory = HasherFactory::new(tampered, Arc::new(NativeRuntime));
    let mut engine = factory.engine();

    let err = engine.setup().await.unwrap_err();
    assert!(matches!(err, Error::ChecksumMismatch { .. }));
    assert!(err.is_compile_failure());
    assert_eq!(engine.state(), EngineState::Uninitialized);
    assert!(factory.loader().cache().is_empty());

    // Still fails on retry, but retrying is allowed
    assert!(engine.digest(b"a").await.is_err());
}

#[tokio::test]
async fn test_failed_compile_is_retried() {
    let runtime = Arc::new(Flaky {
        failures: AtomicUsize::new(1),
        attempts: AtomicUsize::new(0),
    });
    let factory = HasherFactory::new(Artifact::keccak256().unwrap(), runtime.clone());
    let mut engine = factory.engine();

    let err = engine.setup().await.unwrap_err();
    assert!(matches!(err, Error::ArtifactCompile { .. }));
    assert_eq!(engine.state(), EngineState::Uninitialized);

    engine.setup().await.unwrap();
    assert!(engine.is_ready());
    assert_eq!(runtime.attempts.load(Ordering::SeqCst), 2);

    // Successful result is cached from here on
    factory.create_hasher().await.unwrap();
    assert_eq!(runtime.attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_unsupported_environment_is_fatal() {
    let runtime = Arc::new(Unavailable {
        compiles: AtomicUsize::new(0),
    });
    let factory = HasherFactory::new(Artifact::keccak256().unwrap(), runtime.clone());

    let err = factory.create_hasher().await.unwrap_err();
    assert!(matches!(err, Error::UnsupportedEnvironment(_)));
    assert!(!err.is_compile_failure());
    assert_eq!(runtime.compiles.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_malformed_artifact_fails_to_compile() {
    let junk = Artifact::from_bytes("junk", vec![1u8, 2, 3]);
    let factory = HasherFactory::new(junk, Arc::new(NativeRuntime));

    let err = factory.create_hasher().await.unwrap_err();
    assert!(matches!(err, Error::ArtifactCompile { ref name, .. } if name == "junk"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_engines_agree_with_sequential() {
    let data = REDUCE_INPUT.as_bytes();
    let factory = Arc::new(HasherFactory::keccak256().unwrap());

    let mut handles = Vec::new();
    for worker in 0..4u64 {
        let factory = Arc::clone(&factory);
        handles.push(tokio::spawn(async move {
            let mut hasher = factory.create_hasher().await.unwrap();
            let (callback, hits) = recorder();
            let range = worker * 16..(worker + 1) * 16;
            hasher
                .reduce(
                    REDUCE_INPUT.as_bytes(),
                    ReduceOptions::new().range(range).zeros(4).callback(callback),
                )
                .unwrap();
            nonces(&hits)
        }));
    }

    let mut parallel = Vec::new();
    for handle in handles {
        parallel.extend(handle.await.unwrap());
    }

    let mut hasher = factory.create_hasher().await.unwrap();
    let (callback, hits) = recorder();
    hasher
        .reduce(
            data,
            ReduceOptions::new().range(0..64).zeros(4).callback(callback),
        )
        .unwrap();

    assert_eq!(parallel, nonces(&hits));
    assert_eq!(factory.loader().cache().len(), 1);
}
