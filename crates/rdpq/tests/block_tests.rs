//! Block recorder integration tests: lifecycle, buffer growth, submit
//! coalescing, the block/dynamic equivalence law, and dirty-mask handling.

mod common;

use common::MockCp;
use rdpq::cmd::combine::CombineMode;
use rdpq::cmd::ops::{TexFormat, TexSize};
use rdpq::cmd::som::{CycleType, SOM_TF0_RGB_TF1_RGB};
use rdpq::cmd::Color;
use rdpq::{RdpQueue, RdpqError, VertexLayout};

fn make_queue() -> (RdpQueue<MockCp>, MockCp) {
    let mock = MockCp::new();
    let queue = RdpQueue::new(mock.clone());
    (queue, mock)
}

// ============================================================================
// Lifecycle
// ============================================================================

mod lifecycle {
    use super::*;

    #[test]
    fn empty_block_allocates_nothing() {
        let (mut q, mock) = make_queue();
        q.block_begin().unwrap();
        let block = q.block_end().unwrap();
        assert!(mock.alloc_sizes().is_empty(), "allocation must be lazy");
        q.block_run(&block).unwrap();
        assert!(mock.rdp_stream().is_empty());
        q.block_free(block);
        assert_eq!(mock.freed_count(), 0);
    }

    #[test]
    fn first_write_allocates_the_minimum_buffer() {
        let (mut q, mock) = make_queue();
        q.block_begin().unwrap();
        q.fill_rectangle(0.0, 0.0, 4.0, 4.0).unwrap();
        let block = q.block_end().unwrap();
        assert_eq!(mock.alloc_sizes(), vec![64]);
        q.block_free(block);
        assert_eq!(mock.freed_count(), 1);
    }

    #[test]
    fn end_without_begin_is_an_error() {
        let (mut q, _mock) = make_queue();
        assert!(matches!(q.block_end(), Err(RdpqError::NotRecording)));
    }

    #[test]
    fn nested_begin_is_an_error() {
        let (mut q, _mock) = make_queue();
        q.block_begin().unwrap();
        assert!(matches!(q.block_begin(), Err(RdpqError::RecordingActive)));
    }

    #[test]
    fn run_while_recording_is_an_error() {
        let (mut q, _mock) = make_queue();
        q.block_begin().unwrap();
        q.fill_rectangle(0.0, 0.0, 4.0, 4.0).unwrap();
        let block = q.block_end().unwrap();
        q.block_begin().unwrap();
        assert!(matches!(
            q.block_run(&block),
            Err(RdpqError::RecordingActive)
        ));
        q.block_end().unwrap();
        q.block_free(block);
    }

    #[test]
    fn writes_outside_recording_go_dynamic() {
        let (mut q, mock) = make_queue();
        q.fill_rectangle(0.0, 0.0, 4.0, 4.0).unwrap();
        assert!(mock.alloc_sizes().is_empty());
        assert_eq!(mock.rdp_opcodes(), vec![0x36]);
    }
}

// ============================================================================
// Buffer growth
// ============================================================================

mod growth {
    use super::*;

    #[test]
    fn doubling_schedule_caps_at_4192() {
        let (mut q, mock) = make_queue();
        q.block_begin().unwrap();
        for _ in 0..6000 {
            q.fill_rectangle(0.0, 0.0, 4.0, 4.0).unwrap();
        }
        let block = q.block_end().unwrap();

        let sizes = mock.alloc_sizes();
        assert_eq!(
            &sizes[..8],
            &[64, 128, 256, 512, 1024, 2048, 4096, 4192],
            "doubling growth schedule"
        );
        assert!(
            sizes[8..].iter().all(|&s| s == 4192),
            "size stays at the cap after reaching it"
        );

        q.block_run(&block).unwrap();
        assert_eq!(
            mock.rdp_stream().len(),
            6000,
            "every recorded command replays"
        );
        for (start, end) in mock.submits() {
            assert_eq!(start & 7, 0, "submit start 8-byte aligned");
            assert_eq!(end & 7, 0, "submit end 8-byte aligned");
        }
        q.block_free(block);
    }
}

// ============================================================================
// Submit coalescing
// ============================================================================

mod coalescing {
    use super::*;

    #[test]
    fn contiguous_writes_grow_one_submit() {
        let (mut q, mock) = make_queue();
        q.block_begin().unwrap();
        for _ in 0..3 {
            q.fill_rectangle(0.0, 0.0, 4.0, 4.0).unwrap();
        }
        let block = q.block_end().unwrap();
        q.block_run(&block).unwrap();

        assert_eq!(
            mock.submits(),
            vec![(0x1000, 0x1018)],
            "three contiguous commands collapse into one submit"
        );
        q.block_free(block);
    }

    #[test]
    fn fixup_padding_splits_the_range() {
        let (mut q, mock) = make_queue();
        q.block_begin().unwrap();
        q.fill_rectangle(0.0, 0.0, 4.0, 4.0).unwrap();
        q.set_scissor(0.0, 0.0, 8.0, 8.0).unwrap();
        q.fill_rectangle(0.0, 0.0, 4.0, 4.0).unwrap();
        let block = q.block_end().unwrap();
        q.block_run(&block).unwrap();

        assert_eq!(
            mock.submits(),
            vec![(0x1000, 0x1008), (0x1010, 0x1018)],
            "reserved fixup space breaks submit contiguity"
        );
        assert_eq!(
            mock.rdp_opcodes(),
            vec![0x36, 0x2D, 0x36],
            "fixup output lands inside the reserved gap"
        );
        q.block_free(block);
    }
}

// ============================================================================
// Block/dynamic equivalence
// ============================================================================

mod equivalence {
    use super::*;

    fn apply(q: &mut RdpQueue<MockCp>) {
        let shaded = VertexLayout::pos(0).with_shade(2);
        let v1 = [0.0, 0.0, 255.0, 0.0, 0.0, 255.0];
        let v2 = [10.0, 0.0, 255.0, 0.0, 0.0, 255.0];
        let v3 = [5.0, 10.0, 255.0, 0.0, 0.0, 255.0];
        let cc = CombineMode::default();

        q.sync_pipe().unwrap();
        q.sync_tile().unwrap();
        q.sync_load().unwrap();
        q.set_tile(0, TexFormat::Rgba, TexSize::Bits16, 16, 0, 0)
            .unwrap();
        q.set_tile_size(0, 0.0, 0.0, 4.0, 1.0).unwrap();
        q.load_tile(0, 0.0, 0.0, 4.0, 1.0).unwrap();
        q.set_other_modes(CycleType::One.som() | SOM_TF0_RGB_TF1_RGB)
            .unwrap();
        q.set_combine(&cc).unwrap();
        q.set_scissor(0.0, 0.0, 32.0, 32.0).unwrap();
        q.set_color_image(0x0020_0000, TexFormat::Rgba, TexSize::Bits16, 32)
            .unwrap();
        q.set_fill_color(Color::rgba(255, 0, 0, 255)).unwrap();
        q.texture_rectangle(0, 0.0, 0.0, 4.0, 1.0, 0.0, 0.0, 1.0, 1.0)
            .unwrap();
        q.fill_rectangle(0.0, 0.0, 32.0, 32.0).unwrap();
        q.triangle(0, 0, &shaded, &v1, &v2, &v3).unwrap();
        q.sync_full(None).unwrap();
    }

    #[test]
    fn recorded_and_dynamic_streams_are_byte_identical() {
        let (mut q, mock) = make_queue();

        q.block_begin().unwrap();
        apply(&mut q);
        let block = q.block_end().unwrap();
        q.block_run(&block).unwrap();
        let recorded = mock.rdp_stream();
        assert!(!recorded.is_empty());

        mock.reset_execution();
        apply(&mut q);
        let dynamic = mock.rdp_stream();

        assert_eq!(
            recorded, dynamic,
            "block replay must produce the same RDP bytes as dynamic emission"
        );
        q.block_free(block);
    }

    #[test]
    fn replaying_twice_repeats_the_stream() {
        let (mut q, mock) = make_queue();

        q.block_begin().unwrap();
        q.set_scissor(0.0, 0.0, 16.0, 16.0).unwrap();
        q.set_color_image(0x0030_0000, TexFormat::Rgba, TexSize::Bits16, 16)
            .unwrap();
        q.set_fill_color(Color::rgba(200, 40, 40, 255)).unwrap();
        q.fill_rectangle(0.0, 0.0, 16.0, 16.0).unwrap();
        let block = q.block_end().unwrap();

        q.block_run(&block).unwrap();
        let first = mock.rdp_stream();
        q.block_run(&block).unwrap();
        let both = mock.rdp_stream();

        assert_eq!(both.len(), first.len() * 2);
        assert_eq!(&both[..first.len()], &first[..]);
        assert_eq!(&both[first.len()..], &first[..], "second replay identical");
        q.block_free(block);
    }
}

// ============================================================================
// Dirty-mask handling across recording
// ============================================================================

mod autosync_mask {
    use super::*;

    #[test]
    fn block_assumes_everything_dirty_and_restores_on_end() {
        let (mut q, mock) = make_queue();
        let c = Color::rgba(0, 0, 0, 255);

        // Leave the pipe dirty, then record.
        q.fill_rectangle(0.0, 0.0, 4.0, 4.0).unwrap();
        q.block_begin().unwrap();
        // Inside the block every resource counts as dirty, so this change
        // emits a SYNC_PIPE into the block.
        q.set_fog_color(c).unwrap();
        let block = q.block_end().unwrap();

        // The pre-recording mask is restored: the pipe is still dirty from
        // the rectangle above.
        q.set_fog_color(c).unwrap();

        // Running the block loads its final mask, where the tiles were never
        // synced; the next tile change must emit SYNC_TILE.
        q.block_run(&block).unwrap();
        q.set_tile(0, TexFormat::Rgba, TexSize::Bits16, 16, 0, 0)
            .unwrap();

        assert_eq!(
            mock.rdp_opcodes(),
            vec![0x36, 0x27, 0x38, 0x27, 0x38, 0x28, 0x35]
        );
        q.block_free(block);
    }
}
