//! Order book index rebuilt from order lifecycle events.
//!
//! The book keeps the latest snapshot of every order number it has seen and,
//! per side, the resting orders grouped by price. Within a price level orders
//! are kept in the order they were processed; since the simulator feeds the
//! book in chronological order, that is arrival order. The exchange
//! `priority` field is not used for ranking inside a level.
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, btree_map};

use slab::Slab;

use crate::record::{Order, Side};

/// Totally ordered price key.
#[derive(Debug, Clone, Copy)]
pub struct Price(pub f64);

impl PartialEq for Price {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Price {}

impl PartialOrd for Price {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Price {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

#[derive(Debug, Clone)]
struct Node {
    order: Order,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Resting orders at one price, first processed first.
///
/// Orders live in a slab linked from head to tail; `index` maps an order
/// number to its slot so removal does not scan the queue.
#[derive(Debug, Clone)]
pub struct PriceLevel {
    price: f64,
    nodes: Slab<Node>,
    index: HashMap<u64, usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl PriceLevel {
    fn new(price: f64) -> Self {
        Self {
            price,
            nodes: Slab::new(),
            index: HashMap::new(),
            head: None,
            tail: None,
        }
    }

    pub fn price(&self) -> f64 {
        self.price
    }

    /// Orders in queue order.
    pub fn orders(&self) -> LevelOrders<'_> {
        LevelOrders {
            nodes: &self.nodes,
            cursor: self.head,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, number: u64) -> bool {
        self.index.contains_key(&number)
    }

    /// Sum of untraded quantity over the level.
    pub fn total_remaining(&self) -> u64 {
        self.nodes.iter().map(|(_, node)| node.order.remaining()).sum()
    }

    fn push_back(&mut self, order: Order) {
        self.remove(order.number);
        let slot = self.nodes.insert(Node {
            order,
            prev: self.tail,
            next: None,
        });
        match self.tail {
            Some(tail) => self.nodes[tail].next = Some(slot),
            None => self.head = Some(slot),
        }
        self.tail = Some(slot);
        self.index.insert(order.number, slot);
    }

    fn remove(&mut self, number: u64) -> Option<Order> {
        let slot = self.index.remove(&number)?;
        let node = self.nodes.remove(slot);
        match node.prev {
            Some(prev) => self.nodes[prev].next = node.next,
            None => self.head = node.next,
        }
        match node.next {
            Some(next) => self.nodes[next].prev = node.prev,
            None => self.tail = node.prev,
        }
        Some(node.order)
    }
}

/// Orders of a [`PriceLevel`], head first.
pub struct LevelOrders<'a> {
    nodes: &'a Slab<Node>,
    cursor: Option<usize>,
}

impl<'a> Iterator for LevelOrders<'a> {
    type Item = &'a Order;

    fn next(&mut self) -> Option<Self::Item> {
        let nodes = self.nodes;
        let node = &nodes[self.cursor?];
        self.cursor = node.next;
        Some(&node.order)
    }
}

/// Price levels of one side. Bids iterate from the highest price, asks from
/// the lowest.
#[derive(Debug, Clone)]
pub struct BookSide {
    side: Side,
    levels: BTreeMap<Price, PriceLevel>,
}

impl BookSide {
    fn new(side: Side) -> Self {
        Self {
            side,
            levels: BTreeMap::new(),
        }
    }

    /// Levels from best to worst.
    pub fn levels(&self) -> Levels<'_> {
        Levels {
            inner: self.levels.iter(),
            descending: self.side == Side::Buy,
        }
    }

    pub fn best(&self) -> Option<&PriceLevel> {
        self.levels().next()
    }

    pub fn level(&self, price: f64) -> Option<&PriceLevel> {
        self.levels.get(&Price(price))
    }

    /// Number of price levels.
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Number of resting orders across all levels.
    pub fn order_count(&self) -> usize {
        self.levels.values().map(PriceLevel::len).sum()
    }

    fn insert(&mut self, order: Order) {
        self.levels
            .entry(Price(order.price))
            .or_insert_with(|| PriceLevel::new(order.price))
            .push_back(order);
    }

    /// Removes `number` from the level at `price`; absent entries are ignored.
    fn remove(&mut self, price: f64, number: u64) -> Option<Order> {
        let key = Price(price);
        let level = self.levels.get_mut(&key)?;
        let removed = level.remove(number);
        if level.is_empty() {
            self.levels.remove(&key);
        }
        removed
    }
}

/// Best-first iterator over the levels of a [`BookSide`].
pub struct Levels<'a> {
    inner: btree_map::Iter<'a, Price, PriceLevel>,
    descending: bool,
}

impl<'a> Iterator for Levels<'a> {
    type Item = &'a PriceLevel;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = if self.descending {
            self.inner.next_back()
        } else {
            self.inner.next()
        };
        entry.map(|(_, level)| level)
    }
}

#[derive(Debug, Clone)]
pub struct OrderBook {
    orders: HashMap<u64, Order>,
    bids: BookSide,
    asks: BookSide,
}

impl Default for OrderBook {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderBook {
    pub fn new() -> Self {
        Self {
            orders: HashMap::new(),
            bids: BookSide::new(Side::Buy),
            asks: BookSide::new(Side::Sell),
        }
    }

    /// Applies the latest known state of an order.
    ///
    /// The previous snapshot of the same order number, if any, leaves its
    /// level first. A terminal state is recorded but not re-inserted, so the
    /// order stays queryable through [`order`](Self::order) while no longer
    /// resting.
    pub fn process(&mut self, order: Order) {
        if let Some(previous) = self.orders.get(&order.number) {
            let (side, price) = (previous.side, previous.price);
            // already gone when the previous state was terminal
            self.side_mut(side).remove(price, order.number);
        }
        if order.is_resting() {
            self.side_mut(order.side).insert(order);
        }
        self.orders.insert(order.number, order);
    }

    /// Latest snapshot of an order number, resting or not.
    pub fn order(&self, number: u64) -> Option<&Order> {
        self.orders.get(&number)
    }

    /// Whether `number` currently rests on the book.
    pub fn is_resting(&self, number: u64) -> bool {
        self.order(number)
            .filter(|o| o.is_resting())
            .and_then(|o| self.side(o.side).level(o.price))
            .is_some_and(|level| level.contains(number))
    }

    pub fn side(&self, side: Side) -> &BookSide {
        match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        }
    }

    fn side_mut(&mut self, side: Side) -> &mut BookSide {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }

    pub fn bids(&self) -> &BookSide {
        &self.bids
    }

    pub fn asks(&self) -> &BookSide {
        &self.asks
    }

    pub fn best_bid(&self) -> Option<&PriceLevel> {
        self.bids.best()
    }

    pub fn best_ask(&self) -> Option<&PriceLevel> {
        self.asks.best()
    }

    /// Resting orders on both sides.
    pub fn resting_count(&self) -> usize {
        self.bids.order_count() + self.asks.order_count()
    }

    /// Order numbers ever processed, resting or not.
    pub fn known_count(&self) -> usize {
        self.orders.len()
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }
}
