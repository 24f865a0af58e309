//! Communication schedules for boundary updates.
//!
//! [`CommSchedule`] colours the processor-to-processor graph into rounds in
//! which every rank talks to at most one neighbour. [`patch_schedule`] turns
//! that into the ordered list of init/evaluate steps for one rank.

use super::communicator::{CommTag, Communicator, Wait};
use super::transfer::CommsType;
use crate::coupling_error::CouplingError;
use crate::mesh::PatchId;
use itertools::Itertools;

/// Which ranks every rank shares a processor patch with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorTopology {
    neighbours: Vec<Vec<usize>>,
}

impl ProcessorTopology {
    /// From per-rank neighbour lists; the relation is made symmetric and deduplicated.
    pub fn from_lists(lists: Vec<Vec<usize>>) -> Result<Self, CouplingError> {
        let n = lists.len();
        let mut neighbours = vec![Vec::new(); n];
        for (p, list) in lists.iter().enumerate() {
            for &q in list {
                if q >= n {
                    return Err(CouplingError::InvalidConfig(format!(
                        "rank {p} lists neighbour {q} but there are only {n} ranks"
                    )));
                }
                if q != p {
                    neighbours[p].push(q);
                    neighbours[q].push(p);
                }
            }
        }
        for l in &mut neighbours {
            l.sort_unstable();
            l.dedup();
        }
        Ok(Self { neighbours })
    }

    /// Gather every rank's neighbour list by an all-to-all exchange.
    pub fn gather<C: Communicator>(
        comm: &C,
        my_neighbours: &[usize],
        tag: CommTag,
    ) -> Result<Self, CouplingError> {
        let (me, n) = (comm.rank(), comm.size());
        let payload: Vec<u32> = my_neighbours.iter().map(|&q| q as u32).collect();
        let bytes: &[u8] = bytemuck::cast_slice(&payload);

        let recvs: Vec<_> = (0..n)
            .filter(|&p| p != me)
            .map(|p| (p, comm.irecv(p, tag.as_u16(), 0)))
            .collect();
        let sends: Vec<_> = (0..n)
            .filter(|&p| p != me)
            .map(|p| comm.isend(p, tag.as_u16(), bytes))
            .collect();

        let mut lists = vec![Vec::new(); n];
        lists[me] = my_neighbours.to_vec();
        let mut maybe_err = None;
        for (p, h) in recvs {
            match h.wait() {
                Some(data) if data.len() % 4 == 0 => {
                    let mut words = vec![0u32; data.len() / 4];
                    bytemuck::cast_slice_mut::<u32, u8>(&mut words).copy_from_slice(&data);
                    lists[p] = words.into_iter().map(|w| w as usize).collect();
                }
                Some(data) if maybe_err.is_none() => {
                    maybe_err = Some(CouplingError::comm(
                        "processor topology",
                        p,
                        format!("malformed neighbour list of {} bytes", data.len()),
                    ));
                }
                None if maybe_err.is_none() => {
                    maybe_err = Some(CouplingError::comm(
                        "processor topology",
                        p,
                        "no neighbour list received",
                    ));
                }
                _ => {}
            }
        }
        for s in sends {
            let _ = s.wait();
        }
        match maybe_err {
            Some(e) => Err(e),
            None => Self::from_lists(lists),
        }
    }

    pub fn n_procs(&self) -> usize {
        self.neighbours.len()
    }

    pub fn neighbours(&self, rank: usize) -> &[usize] {
        self.neighbours.get(rank).map_or(&[][..], Vec::as_slice)
    }

    /// Every unordered pair of communicating ranks, `(low, high)`, sorted.
    pub fn comms(&self) -> Vec<(usize, usize)> {
        self.neighbours
            .iter()
            .enumerate()
            .flat_map(|(p, l)| l.iter().filter(move |&&q| q > p).map(move |&q| (p, q)))
            .sorted()
            .collect()
    }
}

/// Pairwise communications grouped into rounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommSchedule {
    comms: Vec<(usize, usize)>,
    rounds: Vec<Vec<usize>>,
    proc_schedule: Vec<Vec<usize>>,
}

impl CommSchedule {
    /// Greedy colouring: each pair takes the first round in which neither rank is busy.
    pub fn new(topology: &ProcessorTopology) -> Self {
        let comms = topology.comms();
        let n = topology.n_procs();
        let mut busy: Vec<Vec<bool>> = vec![Vec::new(); n];
        let mut rounds: Vec<Vec<usize>> = Vec::new();
        let mut round_of = Vec::with_capacity(comms.len());

        for (ci, &(a, b)) in comms.iter().enumerate() {
            let r = (0..)
                .find(|&r| {
                    !busy[a].get(r).copied().unwrap_or(false)
                        && !busy[b].get(r).copied().unwrap_or(false)
                })
                .unwrap_or(0);
            for p in [a, b] {
                if busy[p].len() <= r {
                    busy[p].resize(r + 1, false);
                }
                busy[p][r] = true;
            }
            if rounds.len() <= r {
                rounds.resize(r + 1, Vec::new());
            }
            rounds[r].push(ci);
            round_of.push(r);
        }

        let mut proc_schedule = vec![Vec::new(); n];
        for (ci, &(a, b)) in comms.iter().enumerate() {
            proc_schedule[a].push(ci);
            proc_schedule[b].push(ci);
        }
        for list in &mut proc_schedule {
            list.sort_by_key(|&ci| round_of[ci]);
        }
        log::debug!(
            "comm schedule: {} pairs in {} rounds",
            comms.len(),
            rounds.len()
        );
        Self {
            comms,
            rounds,
            proc_schedule,
        }
    }

    pub fn comms(&self) -> &[(usize, usize)] {
        &self.comms
    }

    pub fn rounds(&self) -> &[Vec<usize>] {
        &self.rounds
    }

    /// Ranks `rank` talks to, in round order.
    pub fn partners(&self, rank: usize) -> Vec<usize> {
        self.proc_schedule
            .get(rank)
            .map(|l| {
                l.iter()
                    .map(|&ci| {
                        let (a, b) = self.comms[ci];
                        if a == rank { b } else { a }
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// One step of a boundary update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleEntry {
    pub patch: PatchId,
    /// `true` for the send half, `false` for completion.
    pub init: bool,
}

/// How a patch takes part in scheduling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchRole {
    pub patch: PatchId,
    /// Remote rank for processor patches that talk to another rank.
    pub neighb_rank: Option<usize>,
}

/// Ordered init/evaluate steps for rank `my_rank`.
///
/// Patches without a remote rank come first, each as init then evaluate, in
/// the order given. Processor patches follow: with `Scheduled` they go pair by
/// pair in round order, the higher rank sending first; otherwise every init is
/// posted before any evaluate.
pub fn patch_schedule(
    patches: &[PatchRole],
    my_rank: usize,
    comms_type: CommsType,
    topology: Option<&ProcessorTopology>,
) -> Result<Vec<ScheduleEntry>, CouplingError> {
    let mut out = Vec::with_capacity(2 * patches.len());
    for r in patches.iter().filter(|r| r.neighb_rank.is_none()) {
        out.push(ScheduleEntry {
            patch: r.patch,
            init: true,
        });
        out.push(ScheduleEntry {
            patch: r.patch,
            init: false,
        });
    }
    let procs: Vec<&PatchRole> = patches.iter().filter(|r| r.neighb_rank.is_some()).collect();

    if comms_type == CommsType::Scheduled && !procs.is_empty() {
        let topology = topology.ok_or_else(|| {
            CouplingError::InvalidConfig("scheduled exchange needs a processor topology".to_owned())
        })?;
        let schedule = CommSchedule::new(topology);
        let mut placed = 0;
        for nb in schedule.partners(my_rank) {
            for r in procs.iter().filter(|r| r.neighb_rank == Some(nb)) {
                let order = if my_rank > nb { [true, false] } else { [false, true] };
                out.extend(order.map(|init| ScheduleEntry {
                    patch: r.patch,
                    init,
                }));
                placed += 1;
            }
        }
        if placed != procs.len() {
            return Err(CouplingError::InvalidConfig(format!(
                "rank {my_rank}: processor topology covers {placed} of {} processor patches",
                procs.len()
            )));
        }
    } else {
        out.extend(procs.iter().map(|r| ScheduleEntry {
            patch: r.patch,
            init: true,
        }));
        out.extend(procs.iter().map(|r| ScheduleEntry {
            patch: r.patch,
            init: false,
        }));
    }
    Ok(out)
}
