//! Round-trip, staging, and offset-discipline checks for the
//! memory-ownership machinery, driven against the host-emulated queue.

use std::sync::Arc;

use crucible::prelude::*;

const SENTINEL: u32 = 0xdead_beef;

fn emulated() -> (Arc<HostQueue>, SharedQueue) {
    let queue = Arc::new(HostQueue::new());
    let shared: SharedQueue = queue.clone();
    (queue, shared)
}

fn staged_models() -> [OwnershipModel; 2] {
    [OwnershipModel::DeviceAlloc, OwnershipModel::ManagedBuffer]
}

#[test]
fn staged_round_trip_reproduces_host_content() {
    let (_queue, shared) = emulated();
    for model in staged_models() {
        let spec = InitSpec::uniform(64, 1);
        let provider = RoleDataProvider::<u32>::new(&spec, model, Some(&shared)).unwrap();

        let mut transfer = HostShadowTransfer::new(&provider, MemoryRole::Keys, 64);
        assert!(transfer.is_staged());

        let original: Vec<u32> = (0..64).map(|i| i * 3 + 1).collect();
        transfer.get().copy_from_slice(&original);
        transfer.update_data().unwrap();

        // Wipe the shadow, pull back from the region, expect the original.
        transfer.get().fill(0);
        transfer.retrieve_data().unwrap();
        assert_eq!(&transfer.get()[..], &original[..], "model {model}");
    }
}

#[test]
fn retrieval_is_idempotent_without_device_writes() {
    let (_queue, shared) = emulated();
    let spec = InitSpec::uniform(32, 1);
    let provider =
        RoleDataProvider::<u32>::new(&spec, OwnershipModel::DeviceAlloc, Some(&shared)).unwrap();

    let data: Vec<u32> = (100..132).collect();
    provider.update(MemoryRole::Keys, &data).unwrap();

    let mut transfer = HostShadowTransfer::new(&provider, MemoryRole::Keys, 32);
    transfer.retrieve_data().unwrap();
    let first: Vec<u32> = transfer.get().to_vec();
    transfer.retrieve_data().unwrap();
    let second: Vec<u32> = transfer.get().to_vec();

    assert_eq!(first, data);
    assert_eq!(first, second);
}

#[test]
fn unified_memory_needs_no_staging() {
    let (_queue, shared) = emulated();
    let spec = InitSpec::uniform(16, 1);
    let provider =
        RoleDataProvider::<u32>::new(&spec, OwnershipModel::UnifiedAlloc, Some(&shared)).unwrap();
    assert!(!provider.host_buffering_required());

    let mut transfer = HostShadowTransfer::new(&provider, MemoryRole::Keys, 16);
    assert!(!transfer.is_staged());

    // Writes through the window land without any update_data call.
    fill_with(&mut transfer.get(), |i| i as u32 + 7);
    let mut back = vec![0u32; 16];
    provider.retrieve(MemoryRole::Keys, &mut back).unwrap();
    let expected: Vec<u32> = (0..16).map(|i| i as u32 + 7).collect();
    assert_eq!(back, expected);
}

#[test]
fn zero_size_cell_modifies_no_output_bytes() {
    let (_queue, shared) = emulated();
    for model in staged_models() {
        // Size 0 with the conventional offset still owns `offset` elements;
        // none of them may change across an empty invocation.
        let spec = InitSpec::new(vec![RoleLayout { size: 0, offset: 3 }]);
        let provider = RoleDataProvider::<u32>::new(&spec, model, Some(&shared)).unwrap();
        provider
            .region(MemoryRole::Keys)
            .update(0, &[SENTINEL; 3])
            .unwrap();

        let mut transfer = HostShadowTransfer::new(&provider, MemoryRole::Keys, 0);
        assert!(transfer.get().is_empty());
        transfer.update_data().unwrap();
        transfer.retrieve_data().unwrap();
        transfer.update_data_prefix(0).unwrap();

        let mut raw = [0u32; 3];
        provider
            .region(MemoryRole::Keys)
            .retrieve(0, &mut raw)
            .unwrap();
        assert_eq!(raw, [SENTINEL; 3], "model {model}");
    }
}

#[test]
fn truly_empty_regions_never_allocate() {
    let (queue, shared) = emulated();
    let spec = InitSpec::new(vec![RoleLayout { size: 0, offset: 0 }]);
    let provider =
        RoleDataProvider::<u32>::new(&spec, OwnershipModel::DeviceAlloc, Some(&shared)).unwrap();
    assert_eq!(queue.live_allocations(), 0);
    drop(provider);
    assert_eq!(queue.live_allocations(), 0);
}

#[test]
fn role_offset_prefix_is_never_touched() {
    let (_queue, shared) = emulated();
    for model in [
        OwnershipModel::UnifiedAlloc,
        OwnershipModel::DeviceAlloc,
        OwnershipModel::ManagedBuffer,
    ] {
        let spec = InitSpec::uniform(8, 1);
        let offset = MemoryRole::Keys.default_offset();
        let provider = RoleDataProvider::<u32>::new(&spec, model, Some(&shared)).unwrap();

        let capacity = 8 + offset;
        provider
            .region(MemoryRole::Keys)
            .update(0, &vec![SENTINEL; capacity])
            .unwrap();

        let data: Vec<u32> = (1..=8).collect();
        provider.update(MemoryRole::Keys, &data).unwrap();

        let mut raw = vec![0u32; capacity];
        provider
            .region(MemoryRole::Keys)
            .retrieve(0, &mut raw)
            .unwrap();
        assert_eq!(&raw[..offset], &vec![SENTINEL; offset][..], "model {model}");
        assert_eq!(&raw[offset..], &data[..], "model {model}");
    }
}

#[test]
fn provider_teardown_releases_every_allocation() {
    let (queue, shared) = emulated();
    {
        let spec = InitSpec::uniform(1000, 4);
        let provider =
            RoleDataProvider::<u64>::new(&spec, OwnershipModel::DeviceAlloc, Some(&shared))
                .unwrap();
        assert_eq!(queue.live_allocations(), 4);
        assert!(queue.bytes_in_use() > 0);
        drop(provider);
    }
    assert_eq!(queue.live_allocations(), 0);
    assert_eq!(queue.bytes_in_use(), 0);
}

#[test]
fn host_provider_ignores_the_queue_entirely() {
    let (queue, shared) = emulated();
    let spec = InitSpec::uniform(128, 2);
    let provider =
        RoleDataProvider::<u32>::new(&spec, OwnershipModel::HostContainer, Some(&shared)).unwrap();
    assert_eq!(queue.live_allocations(), 0);

    match provider.start(MemoryRole::Keys) {
        RoleStart::Host(window) => assert_eq!(window.len(), 128),
        RoleStart::Device(_) => panic!("host container produced a device span"),
    };
}

#[test]
fn device_start_positions_are_opaque_spans() {
    let (_queue, shared) = emulated();
    let spec = InitSpec::uniform(8, 1);
    let provider =
        RoleDataProvider::<u32>::new(&spec, OwnershipModel::DeviceAlloc, Some(&shared)).unwrap();

    match provider.start(MemoryRole::Keys) {
        RoleStart::Device(span) => {
            assert_eq!(span.offset, MemoryRole::Keys.default_offset());
            assert_eq!(span.len, 8);
            assert_ne!(span.alloc, AllocId::NONE);
        }
        RoleStart::Host(_) => panic!("device-only region produced a host window"),
    };
}
