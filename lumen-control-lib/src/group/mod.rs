//! The composite tree of bulbs and named subgroups.
//!
//! A [`BulbGroup`] holds an ordered list of children, each either a
//! [`Bulb`] or another group. Control operations invoked on a group fan out
//! to every reachable bulb in depth-first order and collect their outcomes
//! into one flat sequence, so a single bulb, a named room and the whole
//! fleet are addressed uniformly.

use std::cmp::Ordering;
use std::future::Future;
use std::pin::Pin;

use crate::bulb::{
    AdjustAction, AdjustProp, Bulb, BulbError, FlowAction, MusicAction, PowerState,
};

/// One child of a group.
#[derive(Debug, PartialEq, Eq)]
pub enum GroupItem {
    Bulb(Bulb),
    Group(BulbGroup),
}

impl GroupItem {
    pub fn name(&self) -> &str {
        match self {
            GroupItem::Bulb(bulb) => bulb.name(),
            GroupItem::Group(group) => group.name(),
        }
    }
}

impl From<Bulb> for GroupItem {
    fn from(bulb: Bulb) -> Self {
        GroupItem::Bulb(bulb)
    }
}

impl From<BulbGroup> for GroupItem {
    fn from(group: BulbGroup) -> Self {
        GroupItem::Group(group)
    }
}

/**
A named composite of bulbs and subgroups.

Children keep insertion order and are owned by the group; the structure is
a tree by construction (an item is moved in exactly once and never shared).
Equality is structural, ordering is lexicographic by name.
*/
#[derive(Debug, Default, PartialEq, Eq)]
pub struct BulbGroup {
    name: String,
    items: Vec<GroupItem>,
}

impl BulbGroup {
    pub fn new(name: impl Into<String>) -> Self {
        BulbGroup {
            name: name.into(),
            items: Vec::new(),
        }
    }

    pub fn with_items(name: impl Into<String>, items: Vec<GroupItem>) -> Self {
        BulbGroup {
            name: name.into(),
            items,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn items(&self) -> &[GroupItem] {
        &self.items
    }

    pub fn push(&mut self, item: impl Into<GroupItem>) {
        self.items.push(item.into());
    }

    pub fn append(&mut self, items: impl IntoIterator<Item = GroupItem>) {
        self.items.extend(items);
    }

    /// Depth-first traversal over every reachable bulb, flattening nested
    /// subgroups. Each call starts a fresh traversal.
    pub fn bulbs(&self) -> Bulbs<'_> {
        Bulbs {
            stack: vec![self.items.iter()],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bulbs().next().is_none()
    }

    /// Direct children that are groups.
    pub fn subgroups(&self) -> impl Iterator<Item = &BulbGroup> {
        self.items.iter().filter_map(|item| match item {
            GroupItem::Group(group) => Some(group),
            GroupItem::Bulb(_) => None,
        })
    }

    /// Direct child groups whose name matches any of the given names.
    pub fn find_in_subgroups(&self, names: &[&str]) -> Vec<&BulbGroup> {
        self.subgroups()
            .filter(|group| names.contains(&group.name()))
            .collect()
    }

    /// Reachable bulbs whose name or numeric id matches any of the given
    /// identifiers (both compared as strings).
    pub fn find_lamps(&self, identifiers: &[&str]) -> Vec<&Bulb> {
        self.bulbs()
            .filter(|bulb| {
                identifiers
                    .iter()
                    .any(|ident| *ident == bulb.name() || *ident == bulb.id().to_string())
            })
            .collect()
    }

    /// First direct child (bulb or group) with the given name.
    pub fn subgroup(&self, name: &str) -> Option<&GroupItem> {
        self.items.iter().find(|item| item.name() == name)
    }

    pub fn subgroup_names(&self) -> Vec<&str> {
        self.items.iter().map(GroupItem::name).collect()
    }

    /// True if any reachable bulb supports the method.
    pub fn supports(&self, method: &str) -> bool {
        self.bulbs().any(|bulb| bulb.supports(method))
    }

    // ---- broadcast operations --------------------------------------------
    //
    // Each fans out to every reachable bulb sequentially, in traversal
    // order, and fails on the first error. Operations with per-bulb results
    // collect them into one flat ordered sequence.

    pub async fn toggle(&self) -> Result<Vec<PowerState>, BulbError> {
        let mut results = Vec::new();
        for bulb in self.bulbs() {
            results.push(bulb.toggle().await?);
        }
        Ok(results)
    }

    pub async fn set_power(&self, state: PowerState, duration: i64) -> Result<(), BulbError> {
        for bulb in self.bulbs() {
            bulb.set_power(state, duration).await?;
        }
        Ok(())
    }

    pub async fn set_brightness(&self, brightness: i64, duration: i64) -> Result<(), BulbError> {
        for bulb in self.bulbs() {
            bulb.set_brightness(brightness, duration).await?;
        }
        Ok(())
    }

    pub async fn set_color_temperature(
        &self,
        color_temperature: i64,
        duration: i64,
    ) -> Result<(), BulbError> {
        for bulb in self.bulbs() {
            bulb.set_color_temperature(color_temperature, duration).await?;
        }
        Ok(())
    }

    pub async fn set_huesat(&self, hue: i64, sat: i64, duration: i64) -> Result<(), BulbError> {
        for bulb in self.bulbs() {
            bulb.set_huesat(hue, sat, duration).await?;
        }
        Ok(())
    }

    pub async fn set_rgb(&self, rgb: u32, duration: i64) -> Result<(), BulbError> {
        for bulb in self.bulbs() {
            bulb.set_rgb(rgb, duration).await?;
        }
        Ok(())
    }

    /// A separately rolled color per bulb.
    pub async fn random_color(&self, duration: i64) -> Result<Vec<u32>, BulbError> {
        let mut results = Vec::new();
        for bulb in self.bulbs() {
            results.push(bulb.random_color(duration).await?);
        }
        Ok(results)
    }

    pub async fn set_default(&self) -> Result<(), BulbError> {
        for bulb in self.bulbs() {
            bulb.set_default().await?;
        }
        Ok(())
    }

    pub async fn adjust(&self, action: AdjustAction, prop: AdjustProp) -> Result<(), BulbError> {
        for bulb in self.bulbs() {
            bulb.adjust(action, prop).await?;
        }
        Ok(())
    }

    pub async fn adjust_brightness(&self, percentage: i64, duration: i64) -> Result<(), BulbError> {
        for bulb in self.bulbs() {
            bulb.adjust_brightness(percentage, duration).await?;
        }
        Ok(())
    }

    pub async fn adjust_ct(&self, percentage: i64, duration: i64) -> Result<(), BulbError> {
        for bulb in self.bulbs() {
            bulb.adjust_ct(percentage, duration).await?;
        }
        Ok(())
    }

    pub async fn adjust_color(&self, percentage: i64, duration: i64) -> Result<(), BulbError> {
        for bulb in self.bulbs() {
            bulb.adjust_color(percentage, duration).await?;
        }
        Ok(())
    }

    pub async fn start_cf(
        &self,
        count: i64,
        action: FlowAction,
        expression: &[i64],
    ) -> Result<(), BulbError> {
        for bulb in self.bulbs() {
            bulb.start_cf(count, action, expression).await?;
        }
        Ok(())
    }

    pub async fn stop_cf(&self) -> Result<(), BulbError> {
        for bulb in self.bulbs() {
            bulb.stop_cf().await?;
        }
        Ok(())
    }

    pub async fn delayed_shutdown_after(&self, minutes: i64) -> Result<(), BulbError> {
        for bulb in self.bulbs() {
            bulb.delayed_shutdown_after(minutes).await?;
        }
        Ok(())
    }

    pub async fn cancel_delayed_shutdown(&self) -> Result<(), BulbError> {
        for bulb in self.bulbs() {
            bulb.cancel_delayed_shutdown().await?;
        }
        Ok(())
    }

    pub async fn set_music(
        &self,
        action: MusicAction,
        host: &str,
        port: u16,
    ) -> Result<(), BulbError> {
        for bulb in self.bulbs() {
            bulb.set_music(action, host, port).await?;
        }
        Ok(())
    }

    pub async fn reload_state(&self) -> Result<(), BulbError> {
        for bulb in self.bulbs() {
            bulb.reload_state().await?;
        }
        Ok(())
    }

    /// The status glyphs of every reachable bulb, concatenated in traversal
    /// order.
    pub async fn to_icons(&self) -> Result<String, BulbError> {
        let mut icons = String::new();
        for bulb in self.bulbs() {
            icons.push_str(&bulb.to_icon().await?);
        }
        Ok(icons)
    }

    // ---- rendering ---------------------------------------------------------

    /**
    Renders the tree as indented multi-line text: one line per group,
    direct bulbs as a run of status glyphs beneath their group. Child
    groups print sorted by name, bulbs sorted among themselves. `squash`
    drops the bare `|` connector lines.
    */
    pub async fn to_graph(&self, squash: bool) -> Result<String, BulbError> {
        self.render(0, squash).await
    }

    fn render<'a>(
        &'a self,
        deep_level: usize,
        squash: bool,
    ) -> Pin<Box<dyn Future<Output = Result<String, BulbError>> + Send + 'a>> {
        Box::pin(async move {
            let mut graph = draw_group_header(&self.name, deep_level, squash);

            let mut child_bulbs: Vec<&Bulb> = self
                .items
                .iter()
                .filter_map(|item| match item {
                    GroupItem::Bulb(bulb) => Some(bulb),
                    GroupItem::Group(_) => None,
                })
                .collect();
            child_bulbs.sort();

            let mut child_groups: Vec<&BulbGroup> = self.subgroups().collect();
            child_groups.sort_by(|a, b| a.name.cmp(&b.name));

            if !child_bulbs.is_empty() {
                graph.push_str(&draw_bulbs(&child_bulbs, deep_level, squash).await?);
            }
            for group in child_groups {
                graph.push_str(&group.render(deep_level + 1, squash).await?);
            }
            Ok(graph)
        })
    }
}

fn draw_group_header(name: &str, deep_level: usize, squash: bool) -> String {
    let mut result = String::new();
    if deep_level > 0 {
        let indent = "    ".repeat(deep_level - 1);
        if !squash {
            result.push_str(&indent);
            result.push_str("|\n");
        }
        result.push_str(&indent);
        result.push_str("|--");
    }
    result.push_str(name);
    result.push('\n');
    result
}

async fn draw_bulbs(bulbs: &[&Bulb], deep_level: usize, squash: bool) -> Result<String, BulbError> {
    let mut icons = String::new();
    for bulb in bulbs {
        icons.push_str(&bulb.to_icon().await?);
    }

    let indent = "   ".repeat(deep_level);
    let mut result = String::new();
    if !squash {
        result.push_str(&indent);
        result.push_str("  |\n");
    }
    result.push_str(&indent);
    result.push_str("  ");
    result.push_str(&icons);
    result.push('\n');
    Ok(result)
}

impl PartialOrd for BulbGroup {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BulbGroup {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name.cmp(&other.name)
    }
}

/// See [`BulbGroup::bulbs`].
pub struct Bulbs<'a> {
    stack: Vec<std::slice::Iter<'a, GroupItem>>,
}

impl<'a> Iterator for Bulbs<'a> {
    type Item = &'a Bulb;

    fn next(&mut self) -> Option<&'a Bulb> {
        while let Some(iter) = self.stack.last_mut() {
            match iter.next() {
                Some(GroupItem::Bulb(bulb)) => return Some(bulb),
                Some(GroupItem::Group(group)) => self.stack.push(group.items.iter()),
                None => {
                    self.stack.pop();
                }
            }
        }
        None
    }
}
