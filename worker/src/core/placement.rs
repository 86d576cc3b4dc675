//! Placement decisions over already-fetched data

use rand::seq::SliceRandom;
use rand::Rng;

use shared::driver::DatastoreFree;
use shared::UtilizationSnapshot;

use crate::error::{ProvisionError, ProvisionResult};

/// Pick the cluster in `domain` with the most headroom
///
/// When the cluster with the most free CPU is not also the one with the most
/// free memory, one of the two is chosen uniformly at random.
pub fn best_cluster<R: Rng + ?Sized>(snapshot: &UtilizationSnapshot, domain: &str, rng: &mut R) -> ProvisionResult<String> {
    let mut best_cpu: Option<(&String, i64)> = None;
    let mut best_mem: Option<(&String, i64)> = None;

    for (id, usage) in snapshot.in_domain(domain) {
        if best_cpu.map_or(true, |(_, cpu)| usage.free_cpu_mhz > cpu) {
            best_cpu = Some((id, usage.free_cpu_mhz));
        }
        if best_mem.map_or(true, |(_, mem)| usage.free_mem_mib > mem) {
            best_mem = Some((id, usage.free_mem_mib));
        }
    }

    match (best_cpu, best_mem) {
        (Some((cpu_id, _)), Some((mem_id, _))) if cpu_id == mem_id => Ok(cpu_id.clone()),
        (Some((cpu_id, _)), Some((mem_id, _))) => {
            let winner = if rng.gen_bool(0.5) { cpu_id } else { mem_id };
            Ok(winner.clone())
        }
        _ => Err(ProvisionError::unavailable(format!("no cluster in domain {domain}"))),
    }
}

pub fn best_datastore(stores: &[DatastoreFree]) -> ProvisionResult<String> {
    stores
        .iter()
        .max_by_key(|store| store.free_space)
        .map(|store| store.name.clone())
        .ok_or_else(|| ProvisionError::unavailable("no datastore"))
}

pub fn pick_host<R: Rng + ?Sized>(hosts: &[String], rng: &mut R) -> ProvisionResult<String> {
    hosts
        .choose(rng)
        .cloned()
        .ok_or_else(|| ProvisionError::unavailable("no host"))
}
