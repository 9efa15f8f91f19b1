use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use snow_types::{ChannelKind, Snowflake};
use tracing::trace;

use crate::node::{ChannelLayout, ChannelNode};

/// Typed buckets and category links derived from a guild's channel list.
///
/// Each bucket is sorted by `(position, id)`. Every channel of the source list
/// lands in exactly one of `text`, `voice`, `categories` or `other`; channels
/// whose kind is not yet known go to `other`.
pub struct ChannelViews<C> {
    pub text: Vec<Arc<C>>,
    pub voice: Vec<Arc<C>>,
    pub categories: Vec<Arc<C>>,
    pub other: Vec<Arc<C>>,
    /// Category id to its children's ids, ordered like the buckets.
    pub children: BTreeMap<Snowflake, Vec<Snowflake>>,
    /// Channels whose parent is not a category of this collection.
    pub uncategorized: Vec<Snowflake>,
}

impl<C: ChannelNode> ChannelViews<C> {
    /// Build every view from the owned channel list.
    pub fn build(channels: &[Arc<C>]) -> Self {
        let mut laid_out: Vec<(ChannelLayout, &Arc<C>)> =
            channels.iter().map(|c| (c.layout(), c)).collect();
        laid_out.sort_by_key(|(layout, _)| (layout.position, layout.id));

        let mut views = Self::default();
        let mut category_ids: Vec<Snowflake> = Vec::new();

        for (layout, channel) in &laid_out {
            let bucket = match layout.kind {
                ChannelKind::Category => {
                    category_ids.push(layout.id);
                    &mut views.categories
                }
                kind if kind.is_text() => &mut views.text,
                kind if kind.is_voice() => &mut views.voice,
                _ => &mut views.other,
            };
            bucket.push(Arc::clone(channel));
        }

        for id in &category_ids {
            views.children.insert(*id, Vec::new());
        }
        for (layout, _) in &laid_out {
            if layout.kind == ChannelKind::Category {
                continue;
            }
            match layout.parent_id.and_then(|p| views.children.get_mut(&p)) {
                Some(siblings) => siblings.push(layout.id),
                None => views.uncategorized.push(layout.id),
            }
        }

        trace!(
            text = views.text.len(),
            voice = views.voice.len(),
            categories = views.categories.len(),
            other = views.other.len(),
            "channel views rebuilt"
        );
        views
    }

    /// Total number of channels across all buckets.
    pub fn len(&self) -> usize {
        self.text.len() + self.voice.len() + self.categories.len() + self.other.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Children of a category, empty if `category` is not a category here.
    pub fn children_of(&self, category: Snowflake) -> &[Snowflake] {
        self.children.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl<C> Default for ChannelViews<C> {
    fn default() -> Self {
        Self {
            text: Vec::new(),
            voice: Vec::new(),
            categories: Vec::new(),
            other: Vec::new(),
            children: BTreeMap::new(),
            uncategorized: Vec::new(),
        }
    }
}

impl<C> Clone for ChannelViews<C> {
    fn clone(&self) -> Self {
        Self {
            text: self.text.clone(),
            voice: self.voice.clone(),
            categories: self.categories.clone(),
            other: self.other.clone(),
            children: self.children.clone(),
            uncategorized: self.uncategorized.clone(),
        }
    }
}

/// Views are equal when they hold the very same instances in the same order.
impl<C> PartialEq for ChannelViews<C> {
    fn eq(&self, other: &Self) -> bool {
        fn same<C>(a: &[Arc<C>], b: &[Arc<C>]) -> bool {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| Arc::ptr_eq(x, y))
        }
        same(&self.text, &other.text)
            && same(&self.voice, &other.voice)
            && same(&self.categories, &other.categories)
            && same(&self.other, &other.other)
            && self.children == other.children
            && self.uncategorized == other.uncategorized
    }
}

impl<C> fmt::Debug for ChannelViews<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelViews")
            .field("text", &self.text.len())
            .field("voice", &self.voice.len())
            .field("categories", &self.categories.len())
            .field("other", &self.other.len())
            .field("children", &self.children)
            .finish()
    }
}

/// Re-resolve a denormalized pointer (stored by identity) against the current
/// owned collection. Returns `None` when the id is unset or no longer owned.
pub fn resolve<C: ChannelNode>(channels: &[Arc<C>], id: Option<Snowflake>) -> Option<Arc<C>> {
    let id = id?;
    channels.iter().find(|c| c.id() == id).map(Arc::clone)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Node {
        id: Snowflake,
        kind: ChannelKind,
        parent: Option<Snowflake>,
        position: i32,
    }

    impl ChannelNode for Node {
        fn id(&self) -> Snowflake {
            self.id
        }
        fn kind(&self) -> ChannelKind {
            self.kind
        }
        fn parent_id(&self) -> Option<Snowflake> {
            self.parent
        }
        fn position(&self) -> i32 {
            self.position
        }
    }

    fn node(id: u64, kind: ChannelKind, parent: Option<u64>, position: i32) -> Arc<Node> {
        Arc::new(Node {
            id: Snowflake::new(id),
            kind,
            parent: parent.map(Snowflake::new),
            position,
        })
    }

    fn ids(bucket: &[Arc<Node>]) -> Vec<u64> {
        bucket.iter().map(|n| n.id.get()).collect()
    }

    #[test]
    fn partitions_by_discriminant() {
        let channels = vec![
            node(1, ChannelKind::Text, None, 0),
            node(2, ChannelKind::Voice, None, 1),
            node(3, ChannelKind::News, None, 2),
            node(4, ChannelKind::Category, None, 3),
            node(5, ChannelKind::Stage, None, 4),
        ];
        let views = ChannelViews::build(&channels);
        assert_eq!(ids(&views.text), vec![1, 3]);
        assert_eq!(ids(&views.voice), vec![2, 5]);
        assert_eq!(ids(&views.categories), vec![4]);
        assert!(views.other.is_empty());
        assert_eq!(views.len(), 5);
    }

    #[test]
    fn unpopulated_channels_land_in_default_bucket() {
        let channels = vec![node(1, ChannelKind::Unknown, None, 0), node(2, ChannelKind::Text, None, 0)];
        let views = ChannelViews::build(&channels);
        assert_eq!(ids(&views.other), vec![1]);
        assert_eq!(ids(&views.text), vec![2]);
    }

    #[test]
    fn buckets_sorted_by_position_then_id() {
        let channels = vec![
            node(30, ChannelKind::Text, None, 1),
            node(20, ChannelKind::Text, None, 0),
            node(10, ChannelKind::Text, None, 1),
        ];
        let views = ChannelViews::build(&channels);
        assert_eq!(ids(&views.text), vec![20, 10, 30]);
    }

    #[test]
    fn category_children_and_orphans() {
        let channels = vec![
            node(1, ChannelKind::Category, None, 0),
            node(2, ChannelKind::Text, Some(1), 0),
            node(3, ChannelKind::Voice, Some(1), 1),
            node(4, ChannelKind::Text, Some(99), 2),
            node(5, ChannelKind::Text, None, 3),
        ];
        let views = ChannelViews::build(&channels);
        let children: Vec<u64> = views.children_of(Snowflake::new(1)).iter().map(|s| s.get()).collect();
        assert_eq!(children, vec![2, 3]);
        let orphans: Vec<u64> = views.uncategorized.iter().map(|s| s.get()).collect();
        assert_eq!(orphans, vec![4, 5]);
        assert!(views.children_of(Snowflake::new(2)).is_empty());
    }

    #[test]
    fn resolve_against_current_collection() {
        let channels = vec![node(1, ChannelKind::Text, None, 0)];
        assert_eq!(resolve(&channels, Some(Snowflake::new(1))).map(|c| c.id), Some(Snowflake::new(1)));
        assert!(resolve(&channels, Some(Snowflake::new(2))).is_none());
        assert!(resolve(&channels, None).is_none());
    }

    #[test]
    fn empty_collection() {
        let views = ChannelViews::<Node>::build(&[]);
        assert!(views.is_empty());
        assert_eq!(views, ChannelViews::default());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn kind() -> impl Strategy<Value = ChannelKind> {
            prop_oneof![
                Just(ChannelKind::Text),
                Just(ChannelKind::Voice),
                Just(ChannelKind::Category),
                Just(ChannelKind::News),
                Just(ChannelKind::Stage),
                Just(ChannelKind::Unknown),
            ]
        }

        fn collection() -> impl Strategy<Value = Vec<Arc<Node>>> {
            proptest::collection::vec((kind(), proptest::option::of(0u64..8), -3i32..3), 0..24).prop_map(
                |specs| {
                    specs
                        .into_iter()
                        .enumerate()
                        .map(|(i, (kind, parent, position))| node(i as u64, kind, parent, position))
                        .collect()
                },
            )
        }

        proptest! {
            #[test]
            fn rebuild_is_deterministic(channels in collection()) {
                let a = ChannelViews::build(&channels);
                let b = ChannelViews::build(&channels);
                prop_assert_eq!(a, b);
            }

            #[test]
            fn every_channel_in_exactly_one_bucket(channels in collection()) {
                let views = ChannelViews::build(&channels);
                prop_assert_eq!(views.len(), channels.len());
                let linked: usize = views.children.values().map(Vec::len).sum::<usize>() + views.uncategorized.len();
                prop_assert_eq!(linked + views.categories.len(), channels.len());
            }
        }
    }
}
