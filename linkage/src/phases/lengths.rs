use tracing::info;

use crate::{bits, dealer::Dealer, transport::Transport, Error, Session};

/// The opened list lengths and the common length both lists are padded to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lengths {
    len0: usize,
    len1: usize,
    n: usize,
}

impl Lengths {
    /// Creates the lengths for two lists, padding both to the longer one.
    pub fn new(len0: usize, len1: usize) -> Self {
        Self {
            len0,
            len1,
            n: len0.max(len1),
        }
    }

    /// The number of identifiers of party 0.
    pub fn len0(&self) -> usize {
        self.len0
    }

    /// The number of identifiers of party 1.
    pub fn len1(&self) -> usize {
        self.len1
    }

    /// The padded length `max(len0, len1)`.
    pub fn n(&self) -> usize {
        self.n
    }

    /// The true length of the list of input party `pid`.
    pub(crate) fn of(&self, pid: usize) -> Option<usize> {
        match pid {
            0 => Some(self.len0),
            1 => Some(self.len1),
            _ => None,
        }
    }

    /// The number of matrix entries comparing padding with padding, all of which are equal.
    pub fn padding_matches(&self) -> u64 {
        ((self.n - self.len0) as u64) * ((self.n - self.len1) as u64)
    }
}

/// Shares the lengths of both input lists as `width`-bit values and opens them.
///
/// Helpers pass `0`. The local length is checked against the width before anything is shared, and
/// every party waits for both lengths, so no party continues before all agree on the padding.
pub async fn exchange_lengths<T: Transport, D: Dealer>(
    session: &mut Session<T, D>,
    my_len: usize,
    width: u32,
) -> Result<Lengths, Error> {
    let pid = session.pid();
    let own = u64::try_from(my_len).map_err(|_| Error::ValueExceedsWidth)?;
    if pid < 2 && own > bits::mask(width) {
        return Err(Error::ValueExceedsWidth);
    }
    let placeholder = |owner| if pid == owner { own } else { 0 };

    let len0 = session.share_input(0, &[placeholder(0)], width).await?;
    let len1 = session.share_input(1, &[placeholder(1)], width).await?;
    let opened = session.reveal_bool(&[len0[0], len1[0]]).await?;

    let lengths = Lengths::new(opened[0] as usize, opened[1] as usize);
    info!(
        len0 = lengths.len0,
        len1 = lengths.len1,
        n = lengths.n,
        "exchanged lengths"
    );
    Ok(lengths)
}

#[test]
fn padding_matches() {
    assert_eq!(Lengths::new(3, 2).padding_matches(), 0);
    assert_eq!(Lengths::new(0, 4).padding_matches(), 0);
    assert_eq!(Lengths::new(0, 0).padding_matches(), 0);
    assert_eq!(Lengths::new(0, 4).n(), 4);
    assert_eq!(Lengths::new(2, 2).of(1), Some(2));
    assert_eq!(Lengths::new(2, 2).of(2), None);
}
