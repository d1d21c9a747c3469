use crate::error::{
    E_INVALIDARG, OPC_E_BADRIGHTS, OPC_E_INVALIDHANDLE, OPC_E_INVALIDITEMID, OPC_E_UNKNOWNITEMID,
    S_OK, TagError, TagResult,
};
use crate::provider::{
    BatchReadReply, GroupHandle, ItemHandle, ItemReading, OneBasedArray, OpcValue,
    ProviderConnection, ServerState,
};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

const QUALITY_GOOD: u16 = 0xC0;
const QUALITY_BAD: u16 = 0x00;
/// Bad, last known value, used while a group is inactive.
const QUALITY_BAD_OUT_OF_SERVICE: u16 = 0x1C;

#[derive(Debug, Clone)]
struct SimPoint {
    value: OpcValue,
    read_only: bool,
    updated: DateTime<Utc>,
}

#[derive(Debug)]
struct SimGroup {
    name: String,
    active: bool,
    client_tags: HashSet<u32>,
}

#[derive(Debug)]
struct SimItem {
    group: GroupHandle,
    tag: String,
}

/// A write the simulator accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRecord {
    pub group: String,
    pub group_handle: GroupHandle,
    pub tag: String,
    pub value: OpcValue,
}

/// A single-item read the simulator served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRecord {
    pub group: String,
    pub tag: String,
}

/// In-memory provider standing in for a real OPC server.
///
/// Points are keyed by their full `[SOURCE]POINT` name and shared by every
/// group that registers them, the same way a PLC tag is one value no matter
/// how many client groups reference it.
#[derive(Debug)]
pub struct SimulatedProvider {
    state: ServerState,
    known_servers: Option<HashSet<String>>,
    points: HashMap<String, SimPoint>,
    groups: HashMap<GroupHandle, SimGroup>,
    items: HashMap<ItemHandle, SimItem>,
    next_group: u32,
    next_item: u32,
    batch_reads: usize,
    writes: Vec<WriteRecord>,
    single_reads: Vec<ReadRecord>,
}

impl Default for SimulatedProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedProvider {
    pub fn new() -> Self {
        Self {
            state: ServerState::DISCONNECTED,
            known_servers: None,
            points: HashMap::new(),
            groups: HashMap::new(),
            items: HashMap::new(),
            next_group: 0,
            next_item: 0,
            batch_reads: 0,
            writes: Vec::new(),
            single_reads: Vec::new(),
        }
    }

    /// Adds a writable point.
    #[must_use]
    pub fn with_point(mut self, tag: &str, value: OpcValue) -> Self {
        self.insert_point(tag, value, false);
        self
    }

    /// Adds a point that rejects writes with `OPC_E_BADRIGHTS`.
    #[must_use]
    pub fn with_read_only_point(mut self, tag: &str, value: OpcValue) -> Self {
        self.insert_point(tag, value, true);
        self
    }

    /// Restricts `connect` to the given connection identifiers.
    #[must_use]
    pub fn with_known_servers<I, S>(mut self, servers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.known_servers = Some(servers.into_iter().map(Into::into).collect());
        self
    }

    fn insert_point(&mut self, tag: &str, value: OpcValue, read_only: bool) {
        self.points.insert(
            tag.to_string(),
            SimPoint {
                value,
                read_only,
                updated: Utc::now(),
            },
        );
    }

    /// Forces the reported server state, e.g. to simulate a comm fault.
    pub fn set_state(&mut self, state: ServerState) {
        tracing::debug!(state = %state, "simulator: forcing server state");
        self.state = state;
    }

    /// Current value of a point, as the "PLC" sees it.
    pub fn point_value(&self, tag: &str) -> Option<&OpcValue> {
        self.points.get(tag).map(|point| &point.value)
    }

    /// Number of batch read round trips served.
    pub const fn batch_read_count(&self) -> usize {
        self.batch_reads
    }

    pub fn write_log(&self) -> &[WriteRecord] {
        &self.writes
    }

    pub fn single_read_log(&self) -> &[ReadRecord] {
        &self.single_reads
    }

    fn require_connected(&self) -> TagResult<()> {
        if self.state.is_connected() {
            Ok(())
        } else {
            Err(TagError::NotConnected { state: self.state })
        }
    }

    fn group(&self, handle: GroupHandle) -> TagResult<&SimGroup> {
        self.groups
            .get(&handle)
            .ok_or_else(|| TagError::provider(E_INVALIDARG))
    }

    /// Item registered in `group`, or `OPC_E_INVALIDHANDLE`.
    fn item_in(&self, group: GroupHandle, item: ItemHandle) -> Result<&SimItem, i32> {
        match self.items.get(&item) {
            Some(entry) if entry.group == group => Ok(entry),
            _ => Err(OPC_E_INVALIDHANDLE),
        }
    }

    fn sample(&self, group: &SimGroup, tag: &str) -> (OpcValue, i32, u16, DateTime<Utc>) {
        match self.points.get(tag) {
            Some(point) if group.active => (point.value.clone(), S_OK, QUALITY_GOOD, Utc::now()),
            Some(point) => (
                point.value.clone(),
                S_OK,
                QUALITY_BAD_OUT_OF_SERVICE,
                point.updated,
            ),
            None => (
                OpcValue::Empty,
                OPC_E_UNKNOWNITEMID,
                QUALITY_BAD,
                DateTime::<Utc>::UNIX_EPOCH,
            ),
        }
    }
}

/// Checks the `[SOURCE]POINT` shape the simulator accepts.
fn is_valid_tag_name(tag: &str) -> bool {
    tag.strip_prefix('[')
        .and_then(|rest| rest.split_once(']'))
        .is_some_and(|(source, point)| !source.is_empty() && !point.is_empty())
}

impl ProviderConnection for SimulatedProvider {
    fn connect(&mut self, connection_id: &str) -> TagResult<()> {
        if let Some(known) = &self.known_servers
            && !known.contains(connection_id)
        {
            tracing::warn!(server = %connection_id, "simulator: unknown server");
            return Err(TagError::Connection(format!(
                "server '{connection_id}' is not registered"
            )));
        }
        self.state = ServerState::CONNECTED;
        tracing::debug!(server = %connection_id, "simulator: connected");
        Ok(())
    }

    fn disconnect(&mut self) -> TagResult<()> {
        self.groups.clear();
        self.items.clear();
        self.state = ServerState::DISCONNECTED;
        Ok(())
    }

    fn state(&self) -> ServerState {
        self.state
    }

    fn create_group(&mut self, name: &str) -> TagResult<GroupHandle> {
        self.require_connected()?;
        self.next_group += 1;
        let handle = GroupHandle(self.next_group);
        self.groups.insert(
            handle,
            SimGroup {
                name: name.to_string(),
                active: true,
                client_tags: HashSet::new(),
            },
        );
        Ok(handle)
    }

    fn set_group_active(&mut self, group: GroupHandle, active: bool) -> TagResult<()> {
        self.require_connected()?;
        let entry = self
            .groups
            .get_mut(&group)
            .ok_or_else(|| TagError::provider(E_INVALIDARG))?;
        entry.active = active;
        Ok(())
    }

    fn remove_all_groups(&mut self) -> TagResult<()> {
        self.require_connected()?;
        self.groups.clear();
        self.items.clear();
        Ok(())
    }

    fn register_item(
        &mut self,
        group: GroupHandle,
        tag_name: &str,
        client_tag: u32,
    ) -> TagResult<ItemHandle> {
        self.require_connected()?;
        if !is_valid_tag_name(tag_name) {
            return Err(TagError::provider(OPC_E_INVALIDITEMID));
        }
        let entry = self
            .groups
            .get_mut(&group)
            .ok_or_else(|| TagError::provider(E_INVALIDARG))?;
        if client_tag == 0 || !entry.client_tags.insert(client_tag) {
            return Err(TagError::provider(E_INVALIDARG));
        }

        self.next_item += 1;
        let handle = ItemHandle(self.next_item);
        self.items.insert(
            handle,
            SimItem {
                group,
                tag: tag_name.to_string(),
            },
        );
        Ok(handle)
    }

    fn batch_read(
        &mut self,
        group: GroupHandle,
        handles: &OneBasedArray<ItemHandle>,
    ) -> TagResult<BatchReadReply> {
        self.require_connected()?;
        let sim_group = self.group(group)?;

        let mut reply = BatchReadReply::default();
        for (_, handle) in handles.iter() {
            let (value, error, quality, timestamp) = match self.item_in(group, *handle) {
                Ok(item) => self.sample(sim_group, &item.tag),
                Err(code) => (
                    OpcValue::Empty,
                    code,
                    QUALITY_BAD,
                    DateTime::<Utc>::UNIX_EPOCH,
                ),
            };
            reply.values.push(value);
            reply.errors.push(error);
            reply.qualities.push(quality);
            reply.timestamps.push(timestamp);
        }
        self.batch_reads += 1;
        Ok(reply)
    }

    fn read_item(&mut self, group: GroupHandle, item: ItemHandle) -> TagResult<ItemReading> {
        self.require_connected()?;
        let sim_group = self.group(group)?;
        let sim_item = self.item_in(group, item).map_err(TagError::provider)?;
        let (value, _, quality, timestamp) = self.sample(sim_group, &sim_item.tag);
        let record = ReadRecord {
            group: sim_group.name.clone(),
            tag: sim_item.tag.clone(),
        };
        self.single_reads.push(record);
        Ok(ItemReading {
            value,
            quality,
            timestamp,
        })
    }

    fn write_item(
        &mut self,
        group: GroupHandle,
        item: ItemHandle,
        value: &OpcValue,
    ) -> TagResult<()> {
        self.require_connected()?;
        let group_name = self.group(group)?.name.clone();
        let tag = self
            .item_in(group, item)
            .map_err(TagError::provider)?
            .tag
            .clone();

        let point = self
            .points
            .get_mut(&tag)
            .ok_or_else(|| TagError::provider(OPC_E_UNKNOWNITEMID))?;
        if point.read_only {
            return Err(TagError::provider(OPC_E_BADRIGHTS));
        }
        point.value = value.clone();
        point.updated = Utc::now();

        self.writes.push(WriteRecord {
            group: group_name,
            group_handle: group,
            tag,
            value: value.clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected() -> SimulatedProvider {
        let mut sim = SimulatedProvider::new()
            .with_point("[PLC]A", OpcValue::Int(3))
            .with_read_only_point("[PLC]RO", OpcValue::Bool(true));
        sim.connect("RSLinx OPC Server").unwrap();
        sim
    }

    #[test]
    fn tag_name_shape() {
        assert!(is_valid_tag_name("[SP3_FU_MTO_PL01_PEEL]One_Sec_ONS"));
        assert!(is_valid_tag_name("[T]X"));
        assert!(!is_valid_tag_name("NoBrackets"));
        assert!(!is_valid_tag_name("[]X"));
        assert!(!is_valid_tag_name("[T]"));
        assert!(!is_valid_tag_name("[Unclosed"));
    }

    #[test]
    fn unknown_server_is_refused() {
        let mut sim = SimulatedProvider::new().with_known_servers(["RSLinx OPC Server"]);
        assert!(matches!(sim.connect("Other"), Err(TagError::Connection(_))));
        assert_eq!(sim.state(), ServerState::DISCONNECTED);
        sim.connect("RSLinx OPC Server").unwrap();
        assert!(sim.state().is_connected());
    }

    #[test]
    fn duplicate_client_tag_rejected() {
        let mut sim = connected();
        let group = sim.create_group("G").unwrap();
        sim.register_item(group, "[PLC]A", 1).unwrap();
        let err = sim.register_item(group, "[PLC]A", 1).unwrap_err();
        assert_eq!(err.provider_code(), Some(E_INVALIDARG));
        let err = sim.register_item(group, "[PLC]A", 0).unwrap_err();
        assert_eq!(err.provider_code(), Some(E_INVALIDARG));
    }

    #[test]
    fn malformed_tag_rejected() {
        let mut sim = connected();
        let group = sim.create_group("G").unwrap();
        let err = sim.register_item(group, "PLC.A", 1).unwrap_err();
        assert_eq!(err.provider_code(), Some(OPC_E_INVALIDITEMID));
    }

    #[test]
    fn foreign_handle_reads_as_invalid() {
        let mut sim = connected();
        let g1 = sim.create_group("G1").unwrap();
        let g2 = sim.create_group("G2").unwrap();
        let item = sim.register_item(g1, "[PLC]A", 1).unwrap();

        let handles: OneBasedArray<ItemHandle> = [item].into_iter().collect();
        let reply = sim.batch_read(g2, &handles).unwrap();
        assert_eq!(reply.errors.get(1), Some(&OPC_E_INVALIDHANDLE));
        assert_eq!(reply.qualities.get(1), Some(&QUALITY_BAD));
    }

    #[test]
    fn inactive_group_reports_out_of_service() {
        let mut sim = connected();
        let group = sim.create_group("G").unwrap();
        let item = sim.register_item(group, "[PLC]A", 1).unwrap();
        sim.set_group_active(group, false).unwrap();

        let reading = sim.read_item(group, item).unwrap();
        assert_eq!(reading.value, OpcValue::Int(3));
        assert_eq!(reading.quality, QUALITY_BAD_OUT_OF_SERVICE);
    }

    #[test]
    fn read_only_point_rejects_write() {
        let mut sim = connected();
        let group = sim.create_group("G").unwrap();
        let item = sim.register_item(group, "[PLC]RO", 1).unwrap();
        let err = sim.write_item(group, item, &OpcValue::Bool(false)).unwrap_err();
        assert_eq!(err.provider_code(), Some(OPC_E_BADRIGHTS));
        assert_eq!(sim.point_value("[PLC]RO"), Some(&OpcValue::Bool(true)));
        assert!(sim.write_log().is_empty());
    }

    #[test]
    fn comm_fault_blocks_operations() {
        let mut sim = connected();
        let group = sim.create_group("G").unwrap();
        sim.set_state(ServerState::FAILED);
        assert!(matches!(
            sim.create_group("H"),
            Err(TagError::NotConnected { state }) if state == ServerState::FAILED
        ));
        assert!(sim.batch_read(group, &OneBasedArray::new()).is_err());
    }
}
