use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use ts::scte35::segmentation_type;
use ts::{SpliceCommand, SpliceInfoSection};

use crate::clock::Clock;

/// A pending `#EXT-X-DATERANGE` opening, keyed by splice event id.
#[derive(Debug, Clone)]
pub struct PendingOut {
    pub id: String,
    pub start_date: DateTime<Utc>,
    pub attributes: BTreeMap<String, String>,
}

/// A pending `#EXT-X-DATERANGE` closing, keyed by splice event id.
#[derive(Debug, Clone)]
pub struct PendingIn {
    pub id: String,
    pub end_date: DateTime<Utc>,
}

/// Two queues of not-yet-applied SCTE-35 events, keyed by wall-clock date
/// rather than PTS: one for pending OUT (daterange open) events, one for
/// pending IN (daterange close) events.
#[derive(Debug, Default)]
pub struct Scte35Scheduler {
    out_queue: Vec<PendingOut>,
    in_queue: Vec<PendingIn>,
}

impl Scte35Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and enqueue a splice_info_section observed on the SCTE-35 PID.
    /// `pts_adjustment` and `clock` together translate a `pts_time` into a
    /// wall-clock date; `splice_immediate`/no-time events use the clock's
    /// current PCR-derived `now`.
    pub fn ingest(&mut self, section: &SpliceInfoSection, clock: &Clock) {
        match &section.splice_command {
            SpliceCommand::SpliceInsert(insert) => {
                if insert.splice_event_cancel_indicator {
                    self.cancel(insert.splice_event_id);
                    return;
                }
                let id = insert.splice_event_id.to_string();
                let start = self.resolve_time(
                    insert.splice_immediate_flag,
                    insert.splice_time,
                    section.pts_adjustment,
                    clock,
                );
                let Some(start) = start else { return };

                if insert.out_of_network_indicator {
                    let mut attrs = BTreeMap::new();
                    attrs.insert(
                        "SCTE35-OUT".to_string(),
                        format!("0x{:08X}", insert.splice_event_id),
                    );
                    if let Some(duration) = &insert.duration {
                        let seconds = duration.duration as f64 / 90_000.0;
                        attrs.insert("PLANNED-DURATION".to_string(), format!("{seconds:.1}"));
                        if duration.auto_return {
                            self.in_queue.push(PendingIn {
                                id: id.clone(),
                                end_date: start + Duration::milliseconds((seconds * 1000.0) as i64),
                            });
                        }
                    }
                    self.out_queue.push(PendingOut {
                        id,
                        start_date: start,
                        attributes: attrs,
                    });
                } else {
                    self.in_queue.push(PendingIn { id, end_date: start });
                }
            }
            SpliceCommand::TimeSignal(signal) => {
                let Some(start) = self.resolve_time(
                    signal.splice_time.is_none(),
                    signal.splice_time,
                    section.pts_adjustment,
                    clock,
                ) else {
                    return;
                };

                for descriptor in &section.segmentation_descriptors {
                    if descriptor.segmentation_event_cancel_indicator {
                        self.cancel(descriptor.segmentation_event_id);
                        continue;
                    }
                    let id = descriptor.segmentation_event_id.to_string();
                    if segmentation_type::is_advertisement_begin(descriptor.segmentation_type_id) {
                        let mut attrs = BTreeMap::new();
                        attrs.insert(
                            "SCTE35-OUT".to_string(),
                            format!("0x{:08X}", descriptor.segmentation_event_id),
                        );
                        if let Some(duration) = descriptor.segmentation_duration {
                            let seconds = duration as f64 / 90_000.0;
                            attrs.insert("PLANNED-DURATION".to_string(), format!("{seconds:.1}"));
                        }
                        self.out_queue.push(PendingOut {
                            id,
                            start_date: start,
                            attributes: attrs,
                        });
                    } else if segmentation_type::is_advertisement_end(descriptor.segmentation_type_id)
                    {
                        self.in_queue.push(PendingIn { id, end_date: start });
                    }
                }
            }
            _ => {}
        }
    }

    fn resolve_time(
        &self,
        immediate: bool,
        pts_time: Option<u64>,
        pts_adjustment: u64,
        clock: &Clock,
    ) -> Option<DateTime<Utc>> {
        if immediate || pts_time.is_none() {
            return clock.program_date_time(clock.latest_pcr()?);
        }
        let adjusted = pts_time?.wrapping_add(pts_adjustment) % (1u64 << 33);
        clock.program_date_time(adjusted)
    }

    /// `splice_event_id.cancel_indicator = 1`: drop any pending OUT/IN for
    /// that id without ever emitting a daterange.
    pub fn cancel(&mut self, event_id: u32) {
        let id = event_id.to_string();
        self.out_queue.retain(|e| e.id != id);
        self.in_queue.retain(|e| e.id != id);
    }

    /// Drain all OUT events due at or before `pdt`.
    pub fn drain_due_outs(&mut self, pdt: DateTime<Utc>) -> Vec<PendingOut> {
        let (due, pending): (Vec<_>, Vec<_>) =
            self.out_queue.drain(..).partition(|e| e.start_date <= pdt);
        self.out_queue = pending;
        due
    }

    /// Drain all IN events due at or before `pdt`.
    pub fn drain_due_ins(&mut self, pdt: DateTime<Utc>) -> Vec<PendingIn> {
        let (due, pending): (Vec<_>, Vec<_>) =
            self.in_queue.drain(..).partition(|e| e.end_date <= pdt);
        self.in_queue = pending;
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ts::{SpliceCommandType, SpliceInsert};

    fn section_with(command: SpliceCommand) -> SpliceInfoSection {
        SpliceInfoSection {
            table_id: 0xFC,
            protocol_version: 0,
            encrypted_packet: false,
            pts_adjustment: 0,
            splice_command_type: SpliceCommandType::SpliceInsert,
            splice_command: command,
            segmentation_descriptors: Vec::new(),
        }
    }

    #[test]
    fn immediate_out_of_network_enqueues_out_with_auto_return_in() {
        let mut clock = Clock::new();
        clock.update_pcr(1000, Utc::now());
        let mut scheduler = Scte35Scheduler::new();

        let insert = SpliceInsert {
            splice_event_id: 7,
            splice_event_cancel_indicator: false,
            out_of_network_indicator: true,
            program_splice_flag: true,
            splice_immediate_flag: true,
            splice_time: None,
            duration: Some(ts::BreakDuration {
                auto_return: true,
                duration: 30 * 90_000,
            }),
            unique_program_id: 1,
            avail_num: 0,
            avails_expected: 0,
        };
        scheduler.ingest(&section_with(SpliceCommand::SpliceInsert(insert)), &clock);

        assert_eq!(scheduler.out_queue.len(), 1);
        assert_eq!(scheduler.in_queue.len(), 1);
        assert_eq!(scheduler.out_queue[0].id, "7");
        assert_eq!(
            scheduler.out_queue[0].attributes.get("SCTE35-OUT"),
            Some(&"0x00000007".to_string())
        );
    }

    #[test]
    fn cancel_indicator_removes_pending_entries_silently() {
        let mut clock = Clock::new();
        clock.update_pcr(1000, Utc::now());
        let mut scheduler = Scte35Scheduler::new();

        let insert = SpliceInsert {
            splice_event_id: 7,
            splice_event_cancel_indicator: false,
            out_of_network_indicator: true,
            program_splice_flag: true,
            splice_immediate_flag: true,
            splice_time: None,
            duration: None,
            unique_program_id: 1,
            avail_num: 0,
            avails_expected: 0,
        };
        scheduler.ingest(&section_with(SpliceCommand::SpliceInsert(insert)), &clock);
        assert_eq!(scheduler.out_queue.len(), 1);

        let cancel = SpliceInsert {
            splice_event_id: 7,
            splice_event_cancel_indicator: true,
            out_of_network_indicator: false,
            program_splice_flag: false,
            splice_immediate_flag: false,
            splice_time: None,
            duration: None,
            unique_program_id: 1,
            avail_num: 0,
            avails_expected: 0,
        };
        scheduler.ingest(&section_with(SpliceCommand::SpliceInsert(cancel)), &clock);
        assert!(scheduler.out_queue.is_empty());
    }

    #[test]
    fn drain_due_outs_only_returns_entries_at_or_before_pdt() {
        let mut scheduler = Scte35Scheduler::new();
        let now = Utc::now();
        scheduler.out_queue.push(PendingOut {
            id: "1".into(),
            start_date: now,
            attributes: BTreeMap::new(),
        });
        scheduler.out_queue.push(PendingOut {
            id: "2".into(),
            start_date: now + Duration::seconds(10),
            attributes: BTreeMap::new(),
        });
        let due = scheduler.drain_due_outs(now);
        assert_eq!(due.len(), 1);
        assert_eq!(scheduler.out_queue.len(), 1);
    }
}
