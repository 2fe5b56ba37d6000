use std::sync::{Arc, Mutex};

use pretty_assertions::assert_eq;

use core_term::ext_char_registry::ExtendedCharRegistry;
use core_term::interpreter::{Interpreter, RequestedMouseEvents, TitleEventKind};
use core_term::parser::Parser;
use core_term::screen::Screen;

struct Term {
    parser: Parser,
    interpreter: Interpreter,
    screen: Arc<Mutex<Screen>>,
}

impl Term {
    fn new(width: usize, height: usize) -> Self {
        let registry = Arc::new(ExtendedCharRegistry::new());
        let screen = Arc::new(Mutex::new(Screen::new(width, height, registry)));
        let interpreter = Interpreter::new(Arc::clone(&screen));
        Self {
            parser: Parser::new(),
            interpreter,
            screen,
        }
    }

    fn feed(&mut self, bytes: &[u8]) {
        let commands = self.parser.parse(bytes);
        self.interpreter.interpret(&commands);
    }

    fn line(&self, y: i32) -> String {
        let screen = self.screen.lock().unwrap();
        let width = screen.width();
        screen.buffer().dump_unicode_string((0, y), (width, y))
    }

    fn cursor(&self) -> (usize, usize) {
        let screen = self.screen.lock().unwrap();
        (screen.cursor_x(), screen.cursor_y())
    }
}

#[test]
fn types_plain_text() {
    let mut term = Term::new(20, 5);
    term.feed(b"hello, world");
    assert_eq!(term.line(0), "hello, world");
    assert_eq!(term.cursor(), (12, 0));
}

#[test]
fn line_feed_scrolls_at_the_bottom() {
    let mut term = Term::new(10, 2);
    term.feed(b"one\r\ntwo\r\nthree");
    assert_eq!(term.line(0), "two");
    assert_eq!(term.line(1), "three");
    assert_eq!(term.line(-1), "one");
}

#[test]
fn autowrap_continues_on_the_next_line() {
    let mut term = Term::new(4, 3);
    term.feed(b"abcdef");
    assert_eq!(term.line(0), "abcd");
    assert_eq!(term.line(1), "ef");
    assert!(term.screen.lock().unwrap().buffer().line_wrapped(0));
}

#[test]
fn graphics_charset_renders_box_drawing() {
    // ESC ( 0 selects DEC special graphics for G0: "n" becomes a cross
    let mut term = Term::new(10, 2);
    term.feed(b"\x1b(0n");
    assert_eq!(term.line(0), "┼");
}

#[test]
fn charset_round_trip_restores_ascii() {
    let mut term = Term::new(10, 2);
    term.feed(b"\x1b(0n\x1b(Bn");
    assert_eq!(term.line(0), "┼n");
}

#[test]
fn shift_in_and_out_select_g1() {
    // designating graphics into G1 activates the map immediately; SI
    // then selects the untouched G0 and SO brings G1 back
    let mut term = Term::new(10, 2);
    term.feed(b"\x1b)0q\x0fq\x0eq");
    assert_eq!(term.line(0), "─q─");
}

#[test]
fn cursor_visibility_notifications_fire_only_on_change() {
    let mut term = Term::new(10, 2);
    let log = Arc::new(Mutex::new(Vec::new()));
    let log2 = Arc::clone(&log);
    term.interpreter
        .set_show_cursor_changed(move |shown| log2.lock().unwrap().push(shown));

    // already shown: two "on" changes are silent
    term.feed(b"\x1b[?25h\x1b[?25h");
    assert!(log.lock().unwrap().is_empty());

    // a single "off" fires once, repeated offs stay silent
    term.feed(b"\x1b[?25l");
    assert_eq!(*log.lock().unwrap(), vec![false]);
    term.feed(b"\x1b[?25l\x1b[?25l");
    assert_eq!(*log.lock().unwrap(), vec![false]);

    // and back on fires once
    term.feed(b"\x1b[?25h");
    assert_eq!(*log.lock().unwrap(), vec![false, true]);
    assert!(term.interpreter.show_cursor());
}

#[test]
fn save_and_restore_state_round_trips() {
    let mut term = Term::new(20, 5);
    term.feed(b"\x1b[1m\x1b[31m\x1b(0");
    term.feed(b"\x1b[3;7H");
    term.feed(b"\x1b7"); // save
    term.feed(b"\x1b[m\x1b(B\x1b[H");
    assert_eq!(term.cursor(), (0, 0));
    term.feed(b"\x1b8"); // restore
    assert_eq!(term.cursor(), (6, 2));
    // the restored graphics set is active again
    term.feed(b"n");
    assert_eq!(term.line(2).chars().nth(6), Some('┼'));
    // and the restored rendition writes bold red cells
    let screen = term.screen.lock().unwrap();
    let cell = screen.buffer().at(6, 2);
    assert!(cell.attrs.contains(core_term::Attrs::BOLD));
    assert_eq!(cell.foreground, core_term::Color::RED);
}

#[test]
fn scrolling_region_confines_line_feeds() {
    let mut term = Term::new(10, 5);
    term.feed(b"AAA\r\nBBB\r\nCCC\r\nDDD\r\nEEE");
    term.feed(b"\x1b[2;4r"); // rows 1..4 half-open
    term.feed(b"\x1b[4;1H"); // bottom row of the region
    term.feed(b"\n");
    // the region scrolled: row 1 got row 2's content, outside is intact
    assert_eq!(term.line(0), "AAA");
    assert_eq!(term.line(1), "CCC");
    assert_eq!(term.line(2), "DDD");
    assert_eq!(term.line(3), "");
    assert_eq!(term.line(4), "EEE");
}

#[test]
fn origin_mode_biases_absolute_rows() {
    let mut term = Term::new(10, 6);
    term.feed(b"\x1b[3;5r\x1b[?6h");
    // home goes to the region top
    assert_eq!(term.cursor(), (0, 2));
    term.feed(b"\x1b[1;1HX");
    assert_eq!(term.line(2), "X");
}

#[test]
fn device_reports_answer_on_the_output_channel() {
    let mut term = Term::new(10, 4);
    let replies = Arc::new(Mutex::new(Vec::new()));
    let replies2 = Arc::clone(&replies);
    term.interpreter
        .set_output(move |bytes| replies2.lock().unwrap().extend_from_slice(bytes));

    term.feed(b"\x1b[c");
    assert_eq!(&*replies.lock().unwrap(), b"\x1b[?6c");
    replies.lock().unwrap().clear();

    term.feed(b"\x1b[5n");
    assert_eq!(&*replies.lock().unwrap(), b"\x1b[0n");
    replies.lock().unwrap().clear();

    term.feed(b"\x1b[2;4H\x1b[6n");
    assert_eq!(&*replies.lock().unwrap(), b"\x1b[2;4R");
}

#[test]
fn cursor_position_report_is_region_relative_in_origin_mode() {
    let mut term = Term::new(10, 6);
    let replies = Arc::new(Mutex::new(Vec::new()));
    let replies2 = Arc::clone(&replies);
    term.interpreter
        .set_output(move |bytes| replies2.lock().unwrap().extend_from_slice(bytes));

    term.feed(b"\x1b[3;6r\x1b[?6h\x1b[2;2H\x1b[6n");
    assert_eq!(&*replies.lock().unwrap(), b"\x1b[2;2R");
}

#[test]
fn bell_invokes_the_callback() {
    let mut term = Term::new(10, 2);
    let rings = Arc::new(Mutex::new(0));
    let rings2 = Arc::clone(&rings);
    term.interpreter.set_bell(move || *rings2.lock().unwrap() += 1);
    term.feed(b"ding\x07");
    assert_eq!(*rings.lock().unwrap(), 1);
}

#[test]
fn screen_alignment_test_fills_with_e() {
    let mut term = Term::new(4, 2);
    term.feed(b"\x1b#8");
    assert_eq!(term.line(0), "EEEE");
    assert_eq!(term.line(1), "EEEE");
    assert_eq!(term.cursor(), (0, 0));
}

#[test]
fn titles_change_and_deduplicate() {
    let mut term = Term::new(10, 2);
    let events = Arc::new(Mutex::new(Vec::new()));
    let events2 = Arc::clone(&events);
    term.interpreter.set_title_changed(move |title, kind| {
        events2.lock().unwrap().push((title.to_string(), kind));
    });

    term.feed(b"\x1b]2;shell\x07");
    term.feed(b"\x1b]2;shell\x07"); // unchanged: silent
    term.feed(b"\x1b]1;icon\x07");
    let events = events.lock().unwrap();
    assert_eq!(
        &*events,
        &[
            ("shell".to_string(), TitleEventKind::Window),
            ("icon".to_string(), TitleEventKind::Icon),
        ]
    );
}

#[test]
fn title_stacks_save_and_restore_lifo() {
    let mut term = Term::new(10, 2);
    let events = Arc::new(Mutex::new(Vec::new()));
    let events2 = Arc::clone(&events);
    term.interpreter.set_title_changed(move |title, kind| {
        events2.lock().unwrap().push((title.to_string(), kind));
    });

    term.feed(b"\x1b]2;first\x07");
    term.feed(b"\x1b[22;2t"); // push "first"
    term.feed(b"\x1b]2;second\x07");
    term.feed(b"\x1b[22;2t"); // push "second"
    term.feed(b"\x1b]2;third\x07");
    term.feed(b"\x1b[23;2t"); // pop -> "second"
    term.feed(b"\x1b[23;2t"); // pop -> "first"

    let titles: Vec<String> = events.lock().unwrap().iter().map(|(t, _)| t.clone()).collect();
    assert_eq!(titles, vec!["first", "second", "third", "second", "first"]);
}

#[test]
fn alternate_screen_1049_clears_and_restores() {
    let mut term = Term::new(10, 3);
    term.feed(b"primary");
    term.feed(b"\x1b[?1049h");
    assert_eq!(term.line(0), "");
    term.feed(b"tui");
    term.feed(b"\x1b[?1049l");
    assert_eq!(term.line(0), "primary");
}

#[test]
fn mouse_mode_requests_are_published() {
    let mut term = Term::new(10, 2);
    let modes = Arc::new(Mutex::new(Vec::new()));
    let modes2 = Arc::clone(&modes);
    term.interpreter
        .set_requested_mouse_events_changed(move |events| modes2.lock().unwrap().push(events));

    term.feed(b"\x1b[?1000h");
    term.feed(b"\x1b[?1003h");
    term.feed(b"\x1b[?1003l");
    assert_eq!(
        &*modes.lock().unwrap(),
        &[
            RequestedMouseEvents::Normal,
            RequestedMouseEvents::Any,
            RequestedMouseEvents::None,
        ]
    );
}

#[test]
fn resizes_only_when_allowed() {
    let mut term = Term::new(80, 24);
    term.interpreter.set_screen_resize_allowed(false);
    term.feed(b"\x1b[?3h");
    assert_eq!(term.screen.lock().unwrap().width(), 80);

    term.interpreter.set_screen_resize_allowed(true);
    term.feed(b"\x1b[?3h");
    assert_eq!(term.screen.lock().unwrap().width(), 132);
    term.feed(b"\x1b[?3l");
    assert_eq!(term.screen.lock().unwrap().width(), 80);
}

#[test]
fn tab_stops_default_to_every_eight_columns() {
    let mut term = Term::new(40, 2);
    term.feed(b"\tx");
    assert_eq!(term.cursor(), (9, 0));
    let screen = term.screen.lock().unwrap();
    assert_eq!(screen.buffer().at(8, 0).l, 'x' as u32);
}

#[test]
fn custom_tab_stops_override_the_defaults() {
    let mut term = Term::new(40, 2);
    term.feed(b"\x1b[3g"); // clear all stops
    term.feed(b"\x1b[1;5H\x1bH"); // set one at column 4
    term.feed(b"\x1b[1;1H\ty");
    assert_eq!(term.screen.lock().unwrap().buffer().at(4, 0).l, 'y' as u32);
}

#[test]
fn insert_and_delete_characters_shift_the_line() {
    let mut term = Term::new(10, 2);
    term.feed(b"abcdef");
    term.feed(b"\x1b[1;2H\x1b[2P");
    assert_eq!(term.line(0), "adef");
    term.feed(b"\x1b[2@");
    assert_eq!(term.line(0), "a  def");
}

#[test]
fn erase_characters_blank_without_shifting() {
    let mut term = Term::new(10, 2);
    term.feed(b"abcdef");
    term.feed(b"\x1b[1;2H\x1b[3X");
    assert_eq!(term.line(0), "a   ef");
}

#[test]
fn insert_mode_pushes_existing_content() {
    let mut term = Term::new(10, 2);
    term.feed(b"abc\x1b[1;1H\x1b[4hX");
    assert_eq!(term.line(0), "Xabc");
    term.feed(b"\x1b[4l");
}

#[test]
fn combining_marks_merge_within_one_burst() {
    let mut term = Term::new(10, 2);
    term.feed("e\u{0301}".as_bytes());
    assert_eq!(term.line(0), "é");
    assert_eq!(term.cursor(), (1, 0));
}

#[test]
fn combining_marks_merge_into_the_cell_under_the_cursor() {
    let mut term = Term::new(10, 2);
    term.feed(b"e\x1b[1;1H");
    term.feed("\u{0301}".as_bytes());
    assert_eq!(term.line(0), "é");
}

#[test]
fn double_width_characters_advance_by_two() {
    let mut term = Term::new(10, 2);
    term.feed("漢字".as_bytes());
    assert_eq!(term.cursor(), (4, 0));
    let screen = term.screen.lock().unwrap();
    assert_eq!(screen.buffer().at(0, 0).l, '漢' as u32);
    assert_eq!(screen.buffer().at(1, 0).l, core_term::MULTI_CELL_GLYPH);
}

#[test]
fn reverse_index_scrolls_down_at_the_top() {
    let mut term = Term::new(10, 3);
    term.feed(b"first\x1b[1;1H\x1bM");
    assert_eq!(term.line(0), "");
    assert_eq!(term.line(1), "first");
}

#[test]
fn insert_lines_only_works_inside_the_region() {
    let mut term = Term::new(10, 4);
    term.feed(b"a\r\nb\r\nc\r\nd");
    term.feed(b"\x1b[1;2r"); // region rows 0..2
    term.feed(b"\x1b[4;1H\x1b[L"); // outside: ignored
    assert_eq!(term.line(3), "d");
}
