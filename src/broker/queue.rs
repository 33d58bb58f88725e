use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::Arc,
};

use super::BrokerState;
use crate::Message;

/// Опубликованное сообщение вместе с источником.
#[derive(Debug)]
pub(crate) struct Envelope {
    pub(crate) source: Arc<str>,
    pub(crate) message: Message,
}

/// Очередь брокера и всё, что охраняется той же блокировкой.
///
/// У каждого источника своя FIFO-очередь (`lanes`). В `ready` стоят
/// источники, у которых есть сообщения и которые сейчас никто не
/// доставляет; `busy` содержит источники, занятые рабочими потоками.
/// Источник находится либо в `ready`, либо в `busy`, либо ни там, ни там,
/// если его очередь пуста. Так сообщения одного источника доставляются
/// строго по порядку, а выборка не зависит от длины очереди.
#[derive(Debug)]
pub(crate) struct QueueState {
    pub(crate) phase: BrokerState,
    lanes: HashMap<Arc<str>, VecDeque<Message>>,
    ready: VecDeque<Arc<str>>,
    busy: HashSet<Arc<str>>,
    len: usize,
}

impl QueueState {
    pub(crate) fn new() -> Self {
        Self {
            phase: BrokerState::Created,
            lanes: HashMap::new(),
            ready: VecDeque::new(),
            busy: HashSet::new(),
            len: 0,
        }
    }

    /// Сообщения, ожидающие доставки (без тех, что доставляются сейчас).
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Ставит сообщение в очередь источника. Возвращает `true`, если
    /// источник стал готов к доставке и стоит разбудить рабочий поток.
    pub(crate) fn push(
        &mut self,
        envelope: Envelope,
    ) -> bool {
        let Envelope { source, message } = envelope;
        let lane = self.lanes.entry(Arc::clone(&source)).or_default();
        let was_idle = lane.is_empty();
        lane.push_back(message);
        self.len += 1;

        if was_idle && !self.busy.contains(&source) {
            self.ready.push_back(source);
            return true;
        }
        false
    }

    /// Снимает следующее сообщение первого готового источника и помечает
    /// источник занятым.
    pub(crate) fn take_ready(&mut self) -> Option<Envelope> {
        let source = self.ready.pop_front()?;
        let lane = self.lanes.get_mut(&source)?;
        let message = lane.pop_front()?;
        if lane.is_empty() {
            self.lanes.remove(&source);
        }
        self.len -= 1;
        self.busy.insert(Arc::clone(&source));
        Some(Envelope { source, message })
    }

    /// Освобождает источник после доставки. Возвращает `true`, если у
    /// источника остались сообщения и он снова готов.
    pub(crate) fn finish(
        &mut self,
        source: &Arc<str>,
    ) -> bool {
        self.busy.remove(source);
        if self.lanes.contains_key(source) {
            self.ready.push_back(Arc::clone(source));
            return true;
        }
        false
    }

    /// Забирает все ожидающие сообщения. Источники, занятые доставкой,
    /// остаются занятыми до `finish`.
    pub(crate) fn drain_all(&mut self) -> Vec<Envelope> {
        self.ready.clear();
        self.len = 0;
        self.lanes
            .drain()
            .flat_map(|(source, lane)| {
                lane.into_iter().map(move |message| Envelope {
                    source: Arc::clone(&source),
                    message,
                })
            })
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn busy_sources(&self) -> usize {
        self.busy.len()
    }
}
